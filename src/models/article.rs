//! Expiring article records.

use super::RecordId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest description accepted for an article, in characters.
pub const MAX_ARTICLE_DESCRIPTION_CHARS: usize = 4000;

/// A persisted article.
///
/// Articles are reclaimed by the store's time-to-live monitor once
/// `expiration_date` has passed; reads never re-check it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Title.
    pub title: String,
    /// Instant after which the article may be reclaimed.
    pub expiration_date: DateTime<Utc>,
    /// Body text.
    pub description: String,
    /// Attached image files, unique, in the order they were attached.
    #[serde(default)]
    pub image_file_paths: Vec<String>,
}

impl Article {
    /// Returns `true` if at least one image is attached.
    #[must_use]
    pub fn has_images(&self) -> bool {
        !self.image_file_paths.is_empty()
    }
}

/// The caller-controlled fields of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    /// Title.
    pub title: String,
    /// Instant after which the article may be reclaimed.
    pub expiration_date: DateTime<Utc>,
    /// Body text.
    pub description: String,
}

impl NewArticle {
    /// Creates a new article body.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        expiration_date: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            expiration_date,
            description: description.into(),
        }
    }

    /// Checks the request-level constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the title or description is empty, or
    /// the description exceeds [`MAX_ARTICLE_DESCRIPTION_CHARS`].
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        if self.description.is_empty() {
            return Err(Error::Validation(
                "description must not be empty".to_string(),
            ));
        }
        let chars = self.description.chars().count();
        if chars > MAX_ARTICLE_DESCRIPTION_CHARS {
            return Err(Error::Validation(format!(
                "description is {chars} characters (max {MAX_ARTICLE_DESCRIPTION_CHARS})"
            )));
        }
        Ok(())
    }

    /// Builds the record this article becomes once stored under `id`.
    #[must_use]
    pub fn into_article(self, id: RecordId) -> Article {
        Article {
            id,
            title: self.title,
            expiration_date: self.expiration_date,
            description: self.description,
            image_file_paths: Vec::new(),
        }
    }
}
