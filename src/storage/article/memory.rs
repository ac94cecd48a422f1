//! In-memory article store for tests and local runs.

use super::validate_image_path;
use crate::models::{Article, NewArticle, RecordId, insert_unique};
use crate::storage::context::OpContext;
use crate::storage::document::{ArticleDocument, expiration_key};
use crate::storage::metrics::{record_operation_metrics, status_label};
use crate::storage::outcome::UpdateOutcome;
use crate::storage::traits::{ArticleStore, ExpiringCollection};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "memory";

/// In-memory [`ArticleStore`].
///
/// Articles are kept in insertion order in a `Vec` behind an `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryArticleStore {
    articles: RwLock<Vec<ArticleDocument>>,
}

impl InMemoryArticleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored articles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.articles.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Returns `true` if no articles are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_articles<T>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        f: impl FnOnce(&[ArticleDocument]) -> T,
    ) -> Result<T> {
        let start = Instant::now();
        let result = ctx.check(operation).and_then(|()| {
            let articles = self
                .articles
                .read()
                .map_err(|_| Error::persistence(operation, "lock poisoned"))?;
            Ok(f(&articles))
        });
        record_operation_metrics(BACKEND, operation, start, status_label(&result));
        result
    }

    fn write_articles<T>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        f: impl FnOnce(&mut Vec<ArticleDocument>) -> T,
    ) -> Result<T> {
        let start = Instant::now();
        let result = ctx.check(operation).and_then(|()| {
            let mut articles = self
                .articles
                .write()
                .map_err(|_| Error::persistence(operation, "lock poisoned"))?;
            Ok(f(&mut articles))
        });
        record_operation_metrics(BACKEND, operation, start, status_label(&result));
        result
    }

    fn titles_where(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        keep: impl Fn(&ArticleDocument) -> bool,
    ) -> Result<Vec<String>> {
        self.read_articles(ctx, operation, |articles| {
            articles
                .iter()
                .filter(|doc| keep(doc))
                .map(|doc| doc.title.clone())
                .collect()
        })
    }
}

impl ExpiringCollection for InMemoryArticleStore {
    fn collection_name(&self) -> &'static str {
        "articles"
    }

    #[instrument(skip(self), fields(operation = "purge_expired", backend = "memory"))]
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = expiration_key(&now)?;
        self.write_articles(
            &OpContext::background(),
            "purge_expired_articles",
            |articles| {
                let before = articles.len();
                articles.retain(|doc| doc.expiration_nanos > cutoff);
                before - articles.len()
            },
        )
    }
}

impl ArticleStore for InMemoryArticleStore {
    #[instrument(skip(self, ctx, article), fields(operation = "insert_one", backend = "memory"))]
    fn insert_one(&self, ctx: &OpContext, article: &NewArticle) -> Result<RecordId> {
        article.validate()?;
        let id = RecordId::generate();
        let doc = ArticleDocument::new(id, article)?;
        self.write_articles(ctx, "insert_article", |articles| articles.push(doc))?;
        Ok(id)
    }

    #[instrument(skip(self, ctx), fields(operation = "find_one_by_id", backend = "memory", record.id = %id))]
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<Article>> {
        let key = id.to_string();
        let doc = self.read_articles(ctx, "find_article_by_id", |articles| {
            articles.iter().find(|doc| doc.id == key).cloned()
        })?;
        doc.map(Article::try_from).transpose()
    }

    #[instrument(skip(self, ctx), fields(operation = "find_all_titles", backend = "memory"))]
    fn find_all_titles(&self, ctx: &OpContext) -> Result<Vec<String>> {
        self.titles_where(ctx, "find_all_titles", |_| true)
    }

    #[instrument(skip(self, ctx), fields(operation = "find_titles_by_has_image", backend = "memory"))]
    fn find_titles_by_has_image(&self, ctx: &OpContext, with_image: bool) -> Result<Vec<String>> {
        self.titles_where(ctx, "find_titles_by_has_image", |doc| {
            doc.image_paths.is_empty() != with_image
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "append_image", backend = "memory", record.id = %id))]
    fn append_image(&self, ctx: &OpContext, id: &RecordId, path: &str) -> Result<UpdateOutcome> {
        validate_image_path(path)?;
        let key = id.to_string();
        self.write_articles(ctx, "append_image", |articles| {
            articles
                .iter_mut()
                .find(|doc| doc.id == key)
                .map_or(UpdateOutcome::NO_MATCH, |doc| {
                    UpdateOutcome::single(true, insert_unique(&mut doc.image_paths, path))
                })
        })
    }
}
