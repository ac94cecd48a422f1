//! Record storage.
//!
//! Each record type has a store trait and two implementations:
//! - **`SQLite`**: embedded, file-backed or in-memory, with side tables
//!   for set-valued fields and the indexes the queries rely on
//! - **In-memory**: an ordered map behind a lock, for tests and local runs
//!
//! Queries that can return many records hand back a [`DocumentCursor`],
//! which callers drain through [`consume_cursor`].

// Row counts and positions cross between usize and SQLite's i64.
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod article;
pub mod consumer;
pub mod context;
pub mod cursor;
pub mod document;
pub mod metrics;
pub mod outcome;
pub mod sqlite;
pub mod todo;
pub mod traits;
pub mod ttl;

pub use article::{InMemoryArticleStore, SqliteArticleStore};
pub use consumer::consume_cursor;
pub use context::{CancelOnDrop, OpContext};
pub use cursor::{
    BatchCursor, BatchFetch, CursorGuard, CursorLease, CursorTracker, DEFAULT_BATCH_SIZE,
    DocumentCursor,
};
pub use document::{ArticleDocument, TodoDocument};
pub use outcome::{DeleteOutcome, UpdateOutcome};
pub use todo::{InMemoryTodoStore, SqliteTodoStore};
pub use traits::{ArticleStore, ExpiringCollection, TodoCursor, TodoItemStore};
pub use ttl::TtlMonitor;
