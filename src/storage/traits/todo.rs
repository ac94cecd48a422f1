//! Todo item store trait.

use crate::Result;
use crate::models::{NewTodoItem, RecordId, TodoItem};
use crate::storage::context::OpContext;
use crate::storage::cursor::DocumentCursor;
use crate::storage::document::TodoDocument;
use crate::storage::outcome::{DeleteOutcome, UpdateOutcome};

/// Result handle returned by todo item queries.
pub type TodoCursor = Box<dyn DocumentCursor<Document = TodoDocument>>;

/// Persistence and query operations for todo items.
///
/// Implementations own a single collection and its label index, created
/// once at construction. They are shared across request handlers as
/// `Arc<dyn TodoItemStore>` and need no external locking.
///
/// No operation logs, retries or swallows a failure. A missing document is
/// reported through the return value (`None`, zero counts), never as an
/// error.
pub trait TodoItemStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Stores a new item and returns its generated identifier.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`](crate::Error::Validation) for a blank title or
    /// empty label; [`Error::Persistence`](crate::Error::Persistence) if the
    /// write fails.
    fn insert_one(&self, ctx: &OpContext, item: &NewTodoItem) -> Result<RecordId>;

    /// Loads one item, or `None` if no document has `id`.
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<TodoItem>>;

    /// Opens a cursor over every item in insertion order.
    fn find_all(&self, ctx: &OpContext) -> Result<TodoCursor>;

    /// Opens a cursor over items whose labels contain exactly `label`.
    fn find_by_label(&self, ctx: &OpContext, label: &str) -> Result<TodoCursor>;

    /// Adds `label` to the item's label set. Adding a present label is a no-op.
    fn add_label(&self, ctx: &OpContext, id: &RecordId, label: &str) -> Result<UpdateOutcome>;

    /// Removes `label` from the item's label set. Removing an absent label is a no-op.
    fn remove_label(&self, ctx: &OpContext, id: &RecordId, label: &str)
    -> Result<UpdateOutcome>;

    /// Replaces title, due date, labels, description and completion flag.
    ///
    /// The identifier never changes. When nothing has `id` the outcome has
    /// `matched_count == 0`.
    fn update_one_by_id(
        &self,
        ctx: &OpContext,
        id: &RecordId,
        item: &NewTodoItem,
    ) -> Result<UpdateOutcome>;

    /// Deletes the item if present.
    fn delete_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<DeleteOutcome>;

    /// Number of cursors opened by this store and not yet released.
    fn open_cursors(&self) -> usize;
}
