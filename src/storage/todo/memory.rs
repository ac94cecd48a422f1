//! In-memory todo item store for tests and local runs.

use crate::models::{NewTodoItem, RecordId, TodoItem, insert_unique, remove_value};
use crate::storage::context::OpContext;
use crate::storage::cursor::{BatchCursor, CursorTracker};
use crate::storage::document::TodoDocument;
use crate::storage::metrics::{record_operation_metrics, status_label};
use crate::storage::outcome::{DeleteOutcome, UpdateOutcome};
use crate::storage::traits::{TodoCursor, TodoItemStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "memory";

/// Documents keyed by insertion sequence, with an id lookup and a label index.
#[derive(Debug, Default)]
struct Collection {
    next_seq: i64,
    documents: BTreeMap<i64, TodoDocument>,
    by_id: HashMap<String, i64>,
    labels: HashMap<String, BTreeSet<i64>>,
}

impl Collection {
    fn insert(&mut self, doc: TodoDocument) {
        self.next_seq += 1;
        let seq = self.next_seq;
        for label in &doc.labels {
            self.labels.entry(label.clone()).or_default().insert(seq);
        }
        self.by_id.insert(doc.id.clone(), seq);
        self.documents.insert(seq, doc);
    }

    fn get_mut(&mut self, id: &str) -> Option<(i64, &mut TodoDocument)> {
        let seq = *self.by_id.get(id)?;
        self.documents.get_mut(&seq).map(|doc| (seq, doc))
    }

    fn index_label(&mut self, label: &str, seq: i64) {
        self.labels.entry(label.to_string()).or_default().insert(seq);
    }

    fn unindex_label(&mut self, label: &str, seq: i64) {
        if let Some(seqs) = self.labels.get_mut(label) {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.labels.remove(label);
            }
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(seq) = self.by_id.remove(id) else {
            return false;
        };
        if let Some(doc) = self.documents.remove(&seq) {
            for label in &doc.labels {
                self.unindex_label(label, seq);
            }
        }
        true
    }

    /// Up to `want` documents after `after`, optionally restricted to `label`.
    fn page(&self, label: Option<&str>, after: i64, want: usize) -> Vec<(i64, TodoDocument)> {
        let range = (Bound::Excluded(after), Bound::Unbounded);
        match label {
            Some(label) => self
                .labels
                .get(label)
                .into_iter()
                .flat_map(|seqs| seqs.range(range))
                .filter_map(|seq| self.documents.get(seq).map(|doc| (*seq, doc.clone())))
                .take(want)
                .collect(),
            None => self
                .documents
                .range(range)
                .take(want)
                .map(|(seq, doc)| (*seq, doc.clone()))
                .collect(),
        }
    }
}

/// In-memory [`TodoItemStore`].
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust,ignore
/// use todo_list_service::storage::{InMemoryTodoStore, OpContext, TodoItemStore};
///
/// let store = InMemoryTodoStore::new();
/// let id = store.insert_one(&OpContext::background(), &item)?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTodoStore {
    collection: Arc<RwLock<Collection>>,
    cursors: CursorTracker,
}

impl InMemoryTodoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.read().map(|c| c.documents.len()).unwrap_or(0)
    }

    /// Returns `true` if no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` under the read lock, with the same context checks and
    /// metrics as the `SQLite` store.
    fn read<T>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        f: impl FnOnce(&Collection) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = ctx
            .check(operation)
            .and_then(|()| read_lock(&self.collection, operation))
            .and_then(|collection| f(&collection));
        record_operation_metrics(BACKEND, operation, start, status_label(&result));
        result
    }

    fn write<T>(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        f: impl FnOnce(&mut Collection) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = ctx
            .check(operation)
            .and_then(|()| write_lock(&self.collection, operation))
            .and_then(|mut collection| f(&mut collection));
        record_operation_metrics(BACKEND, operation, start, status_label(&result));
        result
    }

    fn open_cursor(&self, ctx: &OpContext, operation: &'static str, label: Option<String>) -> TodoCursor {
        let collection = Arc::clone(&self.collection);
        let ctx = ctx.clone();
        Box::new(BatchCursor::new(
            operation,
            self.cursors.lease(),
            Box::new(move |after, want| {
                ctx.check(operation)?;
                let collection = read_lock(&collection, operation)?;
                Ok(collection.page(label.as_deref(), after, want))
            }),
        ))
    }
}

fn read_lock<'a>(
    lock: &'a RwLock<Collection>,
    operation: &'static str,
) -> Result<RwLockReadGuard<'a, Collection>> {
    lock.read()
        .map_err(|_| Error::persistence(operation, "lock poisoned"))
}

fn write_lock<'a>(
    lock: &'a RwLock<Collection>,
    operation: &'static str,
) -> Result<RwLockWriteGuard<'a, Collection>> {
    lock.write()
        .map_err(|_| Error::persistence(operation, "lock poisoned"))
}

impl TodoItemStore for InMemoryTodoStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, ctx, item), fields(operation = "insert_one", backend = "memory"))]
    fn insert_one(&self, ctx: &OpContext, item: &NewTodoItem) -> Result<RecordId> {
        item.validate()?;
        let id = RecordId::generate();
        let doc = TodoDocument::new(id, item);
        self.write(ctx, "insert_todo", |collection| {
            collection.insert(doc);
            Ok(())
        })?;
        Ok(id)
    }

    #[instrument(skip(self, ctx), fields(operation = "find_one_by_id", backend = "memory", record.id = %id))]
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<TodoItem>> {
        let key = id.to_string();
        let doc = self.read(ctx, "find_todo_by_id", |collection| {
            Ok(collection
                .by_id
                .get(&key)
                .and_then(|seq| collection.documents.get(seq))
                .cloned())
        })?;
        doc.map(TodoItem::try_from).transpose()
    }

    #[instrument(skip(self, ctx), fields(operation = "find_all", backend = "memory"))]
    fn find_all(&self, ctx: &OpContext) -> Result<TodoCursor> {
        ctx.check("find_all")?;
        Ok(self.open_cursor(ctx, "find_all", None))
    }

    #[instrument(skip(self, ctx, label), fields(operation = "find_by_label", backend = "memory", label = %label))]
    fn find_by_label(&self, ctx: &OpContext, label: &str) -> Result<TodoCursor> {
        ctx.check("find_by_label")?;
        Ok(self.open_cursor(ctx, "find_by_label", Some(label.to_string())))
    }

    #[instrument(skip(self, ctx), fields(operation = "add_label", backend = "memory", record.id = %id))]
    fn add_label(&self, ctx: &OpContext, id: &RecordId, label: &str) -> Result<UpdateOutcome> {
        if label.is_empty() {
            return Err(Error::Validation("label must not be empty".to_string()));
        }
        let key = id.to_string();
        self.write(ctx, "add_label", |collection| {
            let Some((seq, doc)) = collection.get_mut(&key) else {
                return Ok(UpdateOutcome::NO_MATCH);
            };
            let modified = insert_unique(&mut doc.labels, label);
            if modified {
                collection.index_label(label, seq);
            }
            Ok(UpdateOutcome::single(true, modified))
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "remove_label", backend = "memory", record.id = %id))]
    fn remove_label(
        &self,
        ctx: &OpContext,
        id: &RecordId,
        label: &str,
    ) -> Result<UpdateOutcome> {
        let key = id.to_string();
        self.write(ctx, "remove_label", |collection| {
            let Some((seq, doc)) = collection.get_mut(&key) else {
                return Ok(UpdateOutcome::NO_MATCH);
            };
            let modified = remove_value(&mut doc.labels, label);
            if modified {
                collection.unindex_label(label, seq);
            }
            Ok(UpdateOutcome::single(true, modified))
        })
    }

    #[instrument(skip(self, ctx, item), fields(operation = "update_one_by_id", backend = "memory", record.id = %id))]
    fn update_one_by_id(
        &self,
        ctx: &OpContext,
        id: &RecordId,
        item: &NewTodoItem,
    ) -> Result<UpdateOutcome> {
        item.validate()?;
        let replacement = TodoDocument::new(*id, item);
        self.write(ctx, "update_todo", |collection| {
            let Some((seq, doc)) = collection.get_mut(&replacement.id) else {
                return Ok(UpdateOutcome::NO_MATCH);
            };
            if *doc == replacement {
                return Ok(UpdateOutcome::single(true, false));
            }
            let previous = std::mem::replace(doc, replacement);
            let current = doc.labels.clone();
            for label in &previous.labels {
                collection.unindex_label(label, seq);
            }
            for label in &current {
                collection.index_label(label, seq);
            }
            Ok(UpdateOutcome::single(true, true))
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "delete_one_by_id", backend = "memory", record.id = %id))]
    fn delete_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<DeleteOutcome> {
        let key = id.to_string();
        self.write(ctx, "delete_todo", |collection| {
            Ok(DeleteOutcome {
                deleted_count: u64::from(collection.remove(&key)),
            })
        })
    }

    fn open_cursors(&self) -> usize {
        self.cursors.open_count()
    }
}
