//! Store traits.
//!
//! Each record type has one trait describing its operations and one
//! implementation per backend. Callers hold the trait object, so the
//! in-memory fakes substitute for `SQLite` without observable differences.

mod article;
mod expiring;
mod todo;

pub use article::ArticleStore;
pub use expiring::ExpiringCollection;
pub use todo::{TodoCursor, TodoItemStore};
