//! Write outcomes.

/// Result of an update-by-id.
///
/// `matched_count == 0` means no document had the id; that is not an error.
/// `modified_count` is lower than `matched_count` when the document already
/// was in the requested state (for example adding a label it already has).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents that matched the id.
    pub matched_count: u64,
    /// Documents whose stored state changed.
    pub modified_count: u64,
}

impl UpdateOutcome {
    /// Nothing matched.
    pub const NO_MATCH: Self = Self {
        matched_count: 0,
        modified_count: 0,
    };

    /// Builds an outcome for a single-document update.
    #[must_use]
    pub const fn single(matched: bool, modified: bool) -> Self {
        Self {
            matched_count: matched as u64,
            modified_count: (matched && modified) as u64,
        }
    }

    /// Returns `true` if a document matched.
    #[must_use]
    pub const fn matched(&self) -> bool {
        self.matched_count > 0
    }

    /// Returns `true` if a document changed.
    #[must_use]
    pub const fn modified(&self) -> bool {
        self.modified_count > 0
    }
}

/// Result of a delete-by-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    /// Documents removed.
    pub deleted_count: u64,
}

impl DeleteOutcome {
    /// Returns `true` if a document was removed.
    #[must_use]
    pub const fn deleted(&self) -> bool {
        self.deleted_count > 0
    }
}
