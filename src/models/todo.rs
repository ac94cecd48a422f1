//! Todo item records.

use super::{RecordId, dedup_preserving_order};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Years a due date may fall in. Stored due dates are RFC 3339 text, which
/// has a four-digit year.
pub const DUE_DATE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// A persisted todo item.
///
/// Serializes with the boundary field names: `id`, `title`, `dueDate`
/// (RFC 3339), `labels` (omitted when empty), `description` (omitted when
/// empty) and `completed` (omitted when false).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Non-empty title.
    pub title: String,
    /// When the item is due.
    pub due_date: DateTime<Utc>,
    /// Labels, unique, in the order they were added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Whether the item is done.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed: bool,
}

impl TodoItem {
    /// Returns the mutable fields of this item.
    #[must_use]
    pub fn to_new(&self) -> NewTodoItem {
        NewTodoItem {
            title: self.title.clone(),
            due_date: self.due_date,
            labels: self.labels.clone(),
            description: self.description.clone(),
            completed: self.completed,
        }
    }

    /// Returns `true` if the item carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// The caller-controlled fields of a todo item.
///
/// Used both for inserts and for full-record updates. There is no `id`
/// field: identifiers are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodoItem {
    /// Non-empty title.
    pub title: String,
    /// When the item is due.
    pub due_date: DateTime<Utc>,
    /// Initial labels. Duplicates collapse on write.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Whether the item is done.
    #[serde(default)]
    pub completed: bool,
}

impl NewTodoItem {
    /// Creates an item with no labels, an empty description, not completed.
    #[must_use]
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            due_date,
            labels: Vec::new(),
            description: String::new(),
            completed: false,
        }
    }

    /// Sets the labels.
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the completion flag.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Checks the field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the title is blank, a label is empty,
    /// or the due date's year is outside [`DUE_DATE_YEARS`].
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if !DUE_DATE_YEARS.contains(&self.due_date.year()) {
            return Err(Error::Validation(format!(
                "due date {} is outside years 0000-9999",
                self.due_date
            )));
        }
        if self.labels.iter().any(String::is_empty) {
            return Err(Error::Validation("labels must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the labels with duplicates removed, first occurrence kept.
    #[must_use]
    pub fn normalized_labels(&self) -> Vec<String> {
        dedup_preserving_order(self.labels.iter().map(String::as_str))
    }

    /// Builds the record this item becomes once stored under `id`.
    #[must_use]
    pub fn into_item(self, id: RecordId) -> TodoItem {
        let labels = self.normalized_labels();
        TodoItem {
            id,
            title: self.title,
            due_date: self.due_date,
            labels,
            description: self.description,
            completed: self.completed,
        }
    }
}
