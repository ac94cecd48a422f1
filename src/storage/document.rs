//! Stored representations.
//!
//! Backends persist documents, not records. A document keeps every field in
//! its storage-native form (ids and timestamps as text or integers), and
//! decoding one back into a record can fail independently of the query that
//! produced it. Those failures surface as [`Error::Decoding`].

use crate::models::{Article, NewArticle, NewTodoItem, RecordId, TodoItem};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

const TODO_RECORD: &str = "todo item";
const ARTICLE_RECORD: &str = "article";

/// Stored form of a [`TodoItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDocument {
    /// Identifier text.
    pub id: String,
    /// Title.
    pub title: String,
    /// Due date, RFC 3339.
    pub due_date: String,
    /// Labels in insertion order.
    pub labels: Vec<String>,
    /// Description.
    pub description: String,
    /// Completion flag.
    pub completed: bool,
}

impl TodoDocument {
    /// Encodes `fields` as the document stored under `id`.
    #[must_use]
    pub fn new(id: RecordId, fields: &NewTodoItem) -> Self {
        Self {
            id: id.to_string(),
            title: fields.title.clone(),
            due_date: encode_timestamp(&fields.due_date),
            labels: fields.normalized_labels(),
            description: fields.description.clone(),
            completed: fields.completed,
        }
    }
}

impl From<&TodoItem> for TodoDocument {
    fn from(item: &TodoItem) -> Self {
        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            due_date: encode_timestamp(&item.due_date),
            labels: item.labels.clone(),
            description: item.description.clone(),
            completed: item.completed,
        }
    }
}

impl TryFrom<TodoDocument> for TodoItem {
    type Error = Error;

    fn try_from(doc: TodoDocument) -> Result<Self> {
        let id = decode_id(TODO_RECORD, &doc.id)?;
        if doc.title.trim().is_empty() {
            return Err(Error::Decoding {
                record: TODO_RECORD,
                cause: format!("document {id} has an empty title"),
            });
        }
        let due_date = DateTime::parse_from_rfc3339(&doc.due_date)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| Error::Decoding {
                record: TODO_RECORD,
                cause: format!("document {id} has invalid dueDate '{}': {e}", doc.due_date),
            })?;

        Ok(Self {
            id,
            title: doc.title,
            due_date,
            labels: doc.labels,
            description: doc.description,
            completed: doc.completed,
        })
    }
}

/// Stored form of an [`Article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDocument {
    /// Identifier text.
    pub id: String,
    /// Title.
    pub title: String,
    /// Expiration instant as Unix nanoseconds; the time-to-live key.
    pub expiration_nanos: i64,
    /// Description.
    pub description: String,
    /// Image paths in attachment order.
    pub image_paths: Vec<String>,
}

impl ArticleDocument {
    /// Encodes `fields` as the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the expiration date cannot be
    /// represented as Unix nanoseconds.
    pub fn new(id: RecordId, fields: &NewArticle) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            title: fields.title.clone(),
            expiration_nanos: expiration_key(&fields.expiration_date)?,
            description: fields.description.clone(),
            image_paths: Vec::new(),
        })
    }
}

impl TryFrom<ArticleDocument> for Article {
    type Error = Error;

    fn try_from(doc: ArticleDocument) -> Result<Self> {
        Ok(Self {
            id: decode_id(ARTICLE_RECORD, &doc.id)?,
            title: doc.title,
            expiration_date: Utc.timestamp_nanos(doc.expiration_nanos),
            description: doc.description,
            image_file_paths: doc.image_paths,
        })
    }
}

/// Converts an instant to the integer key the time-to-live index orders by.
///
/// # Errors
///
/// Returns [`Error::Validation`] for instants outside 1677..=2262.
pub fn expiration_key(instant: &DateTime<Utc>) -> Result<i64> {
    instant.timestamp_nanos_opt().ok_or_else(|| {
        Error::Validation(format!(
            "expiration date {instant} is outside the supported range"
        ))
    })
}

/// Formats a timestamp the way documents store it.
#[must_use]
pub fn encode_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode_id(record: &'static str, raw: &str) -> Result<RecordId> {
    RecordId::parse(raw).map_err(|_| Error::Decoding {
        record,
        cause: format!("invalid id '{raw}'"),
    })
}
