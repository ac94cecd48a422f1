//! Insertion-ordered set helpers for labels and image paths.
//!
//! Set-valued fields are stored as plain sequences: no duplicates, and the
//! order among distinct values is the order they were first added.

use std::collections::HashSet;

/// Appends `value` unless it is already present. Returns `true` if appended.
pub fn insert_unique(values: &mut Vec<String>, value: &str) -> bool {
    if values.iter().any(|v| v == value) {
        return false;
    }
    values.push(value.to_string());
    true
}

/// Removes every occurrence of `value`. Returns `true` if anything was removed.
pub fn remove_value(values: &mut Vec<String>, value: &str) -> bool {
    let before = values.len();
    values.retain(|v| v != value);
    values.len() != before
}

/// Drops repeated values, keeping the first occurrence of each.
#[must_use]
pub fn dedup_preserving_order<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(Into::into)
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
