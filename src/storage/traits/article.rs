//! Article store trait.

use super::ExpiringCollection;
use crate::Result;
use crate::models::{Article, NewArticle, RecordId};
use crate::storage::context::OpContext;
use crate::storage::outcome::UpdateOutcome;

/// Persistence and query operations for expiring articles.
///
/// The expiration field carries a time-to-live index: expired articles are
/// reclaimed by [`ExpiringCollection::purge_expired`], normally driven by a
/// [`TtlMonitor`](crate::storage::TtlMonitor). Reads never filter on it.
///
/// The store puts no bound on the number of attached images; callers that
/// need one enforce it before calling [`append_image`](Self::append_image).
pub trait ArticleStore: ExpiringCollection {
    /// Stores a new article with no images and returns its identifier.
    fn insert_one(&self, ctx: &OpContext, article: &NewArticle) -> Result<RecordId>;

    /// Loads one article, or `None` if no document has `id`.
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<Article>>;

    /// Titles of every article, in insertion order.
    fn find_all_titles(&self, ctx: &OpContext) -> Result<Vec<String>>;

    /// Titles of articles with (`true`) or without (`false`) any image.
    fn find_titles_by_has_image(&self, ctx: &OpContext, with_image: bool) -> Result<Vec<String>>;

    /// Adds `path` to the article's image set. A present path is a no-op.
    fn append_image(&self, ctx: &OpContext, id: &RecordId, path: &str) -> Result<UpdateOutcome>;
}
