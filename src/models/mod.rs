//! Record types.
//!
//! This module contains the in-memory shapes of the two record types and the
//! identifier shared by both. Stored representations live in
//! [`crate::storage::document`].

mod article;
mod id;
mod ordered_set;
mod todo;

pub use article::{Article, MAX_ARTICLE_DESCRIPTION_CHARS, NewArticle};
pub use id::RecordId;
pub use ordered_set::{dedup_preserving_order, insert_unique, remove_value};
pub use todo::{DUE_DATE_YEARS, NewTodoItem, TodoItem};
