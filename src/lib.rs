//! # Todo list service
//!
//! Record management backend for todo items and expiring articles.
//!
//! Records live in an embedded document store (`SQLite`, or an in-process
//! fake with identical behaviour) and are served over HTTP.
//!
//! ## Layers
//!
//! - **Record stores** ([`storage::TodoItemStore`], [`storage::ArticleStore`]):
//!   create/read/update/delete plus set mutations on labels and image paths.
//!   Stores own their supporting indexes and never cache records.
//! - **Bounded result consumer** ([`storage::consume_cursor`]): drains a result
//!   handle into at most `max` decoded records and always releases the handle.
//! - **HTTP surface** ([`http`]): thin axum handlers on top of the stores.
//!
//! ## Example
//!
//! ```rust,ignore
//! use todo_list_service::models::NewTodoItem;
//! use todo_list_service::storage::{OpContext, SqliteTodoStore, TodoItemStore, consume_cursor};
//!
//! let store = SqliteTodoStore::in_memory()?;
//! let ctx = OpContext::background();
//! let id = store.insert_one(&ctx, &NewTodoItem::new("Buy milk", due))?;
//! store.add_label(&ctx, &id, "errands")?;
//! let items = consume_cursor(store.find_by_label(&ctx, "errands")?, 100)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
#[cfg(feature = "http")]
pub mod http;
pub mod models;
pub mod observability;
pub mod storage;

pub use config::ServiceConfig;
pub use models::{Article, NewArticle, NewTodoItem, RecordId, TodoItem};
pub use storage::{
    ArticleStore, DeleteOutcome, OpContext, TodoItemStore, UpdateOutcome, consume_cursor,
};

/// Why a persistence call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceErrorKind {
    /// The backing store rejected or failed the call.
    Backend,
    /// The caller cancelled the operation.
    Cancelled,
    /// The caller's deadline passed before the call completed.
    DeadlineExceeded,
}

impl PersistenceErrorKind {
    /// Returns the kind as a static label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl std::fmt::Display for PersistenceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for record operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Malformed identifier, empty title, zero result cap, bad request body |
/// | `Persistence` | The store call failed, was cancelled, or ran past its deadline |
/// | `Decoding` | A stored document cannot be read back as a record |
/// | `Config` | Environment or config file values are invalid |
/// | `OperationFailed` | Non-store failures (socket bind, upload write) |
///
/// A point lookup that matches nothing is not an error: stores return
/// `Ok(None)` for it.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Caller-supplied input is malformed. Raised before any store call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A backing-store call failed.
    #[error("persistence operation '{operation}' failed ({kind}): {cause}")]
    Persistence {
        /// The store operation that failed.
        operation: String,
        /// Failure classification.
        kind: PersistenceErrorKind,
        /// The underlying cause.
        cause: String,
    },

    /// A stored document could not be interpreted as the expected record.
    #[error("failed to decode {record} document: {cause}")]
    Decoding {
        /// Record type being decoded.
        record: &'static str,
        /// What was wrong with the document.
        cause: String,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A non-store operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a backend persistence error.
    pub fn persistence(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Persistence {
            operation: operation.into(),
            kind: PersistenceErrorKind::Backend,
            cause: cause.to_string(),
        }
    }

    /// Returns the persistence kind, if this is a persistence error.
    #[must_use]
    pub const fn persistence_kind(&self) -> Option<PersistenceErrorKind> {
        match self {
            Self::Persistence { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` for cancellation and deadline failures.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(
            self.persistence_kind(),
            Some(PersistenceErrorKind::Cancelled | PersistenceErrorKind::DeadlineExceeded)
        )
    }
}

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, Error>;
