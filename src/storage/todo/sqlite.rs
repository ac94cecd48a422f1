//! `SQLite`-backed todo item store.
//!
//! Items live in `todo_items`; labels live in `todo_labels`, one row per
//! (item, label) pair. The composite primary key gives labels set semantics
//! and `position` keeps their insertion order. Label add/remove are single
//! statements, so concurrent mutations of one item never lose each other.

use crate::models::{NewTodoItem, RecordId, TodoItem};
use crate::storage::context::OpContext;
use crate::storage::cursor::CursorTracker;
use crate::storage::document::TodoDocument;
use crate::storage::outcome::{DeleteOutcome, UpdateOutcome};
use crate::storage::sqlite::{
    BatchLoader, SqliteHandle, lock_connection, open_connection, open_cursor, run_operation,
    sql_err, with_transaction,
};
use crate::storage::traits::{TodoCursor, TodoItemStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const SELECT_BY_ID: &str = "SELECT seq, id, title, due_date, description, completed
     FROM todo_items WHERE id = ?1";

const SELECT_PAGE: &str = "SELECT seq, id, title, due_date, description, completed
     FROM todo_items WHERE seq > ?1 ORDER BY seq LIMIT ?2";

const SELECT_PAGE_BY_LABEL: &str = "SELECT seq, id, title, due_date, description, completed
     FROM todo_items
     WHERE seq > ?1 AND id IN (SELECT item_id FROM todo_labels WHERE label = ?3)
     ORDER BY seq LIMIT ?2";

/// `SQLite`-backed [`TodoItemStore`].
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` shared with the cursors this store opens.
/// Cursors lock it per batch, not for their whole lifetime.
///
/// # Schema
///
/// - `todo_items`: `seq` (insertion order), `id`, `title`, `due_date`
///   (RFC 3339 text), `description`, `completed`
/// - `todo_labels`: `item_id`, `label`, `position`, cascading on item delete
/// - `idx_todo_labels_label`: non-unique index serving label lookups
pub struct SqliteTodoStore {
    conn: SqliteHandle,
    db_path: Option<PathBuf>,
    cursors: CursorTracker,
}

impl SqliteTodoStore {
    /// Opens (or creates) a file-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema and
    /// label index cannot be created.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use todo_list_service::storage::SqliteTodoStore;
    ///
    /// let store = SqliteTodoStore::new("./todos.db")?;
    /// # Ok::<(), todo_list_service::Error>(())
    /// ```
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(Some(&db_path))?;
        Self::build(conn, Some(db_path))
    }

    /// Creates an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::build(open_connection(None)?, None)
    }

    /// Creates a store on an existing connection, e.g. one shared with an
    /// article store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn from_handle(conn: SqliteHandle) -> Result<Self> {
        Self::build(conn, None)
    }

    /// Returns the database path (None for in-memory or shared handles).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn build(conn: SqliteHandle, db_path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn,
            db_path,
            cursors: CursorTracker::new(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates the tables and the label index. Idempotent.
    fn initialize(&self) -> Result<()> {
        let conn = lock_connection(&self.conn);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS todo_items (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                due_date TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                completed INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS todo_labels (
                item_id TEXT NOT NULL REFERENCES todo_items(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (item_id, label)
            );",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_todo_tables".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_todo_labels_label ON todo_labels(label)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_labels_index".to_string(),
            cause: e.to_string(),
        })?;

        tracing::debug!(db_path = ?self.db_path, "Todo item schema ready");
        Ok(())
    }
}

fn read_document(row: &Row<'_>) -> rusqlite::Result<(i64, TodoDocument)> {
    Ok((
        row.get(0)?,
        TodoDocument {
            id: row.get(1)?,
            title: row.get(2)?,
            due_date: row.get(3)?,
            labels: Vec::new(),
            description: row.get(4)?,
            completed: row.get(5)?,
        },
    ))
}

fn load_labels(conn: &Connection, item_id: &str, operation: &'static str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT label FROM todo_labels WHERE item_id = ?1 ORDER BY position")
        .map_err(sql_err(operation))?;
    let labels = stmt
        .query_map(params![item_id], |row| row.get(0))
        .map_err(sql_err(operation))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(sql_err(operation))?;
    Ok(labels)
}

fn insert_labels(
    conn: &Connection,
    item_id: &str,
    labels: &[String],
    operation: &'static str,
) -> Result<()> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO todo_labels (item_id, label, position) VALUES (?1, ?2, ?3)",
        )
        .map_err(sql_err(operation))?;
    for (position, label) in labels.iter().enumerate() {
        stmt.execute(params![item_id, label, position as i64])
            .map_err(sql_err(operation))?;
    }
    Ok(())
}

fn item_exists(conn: &Connection, item_id: &str, operation: &'static str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM todo_items WHERE id = ?1)",
        params![item_id],
        |row| row.get(0),
    )
    .map_err(sql_err(operation))
}

fn find_document(
    conn: &Connection,
    item_id: &str,
    operation: &'static str,
) -> Result<Option<TodoDocument>> {
    let found = conn
        .query_row(SELECT_BY_ID, params![item_id], read_document)
        .optional()
        .map_err(sql_err(operation))?;
    match found {
        Some((_, mut doc)) => {
            doc.labels = load_labels(conn, &doc.id, operation)?;
            Ok(Some(doc))
        },
        None => Ok(None),
    }
}

/// Builds the batch loader behind `find_all` (no label) and `find_by_label`.
fn page_loader(label: Option<String>, operation: &'static str) -> BatchLoader<TodoDocument> {
    Box::new(
        move |conn: &Connection, after: i64, limit: usize| -> Result<Vec<(i64, TodoDocument)>> {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mut docs = match &label {
                Some(label) => conn
                    .prepare_cached(SELECT_PAGE_BY_LABEL)
                    .and_then(|mut stmt| {
                        stmt.query_map(params![after, limit, label], read_document)?
                            .collect::<rusqlite::Result<Vec<_>>>()
                    }),
                None => conn.prepare_cached(SELECT_PAGE).and_then(|mut stmt| {
                    stmt.query_map(params![after, limit], read_document)?
                        .collect::<rusqlite::Result<Vec<_>>>()
                }),
            }
            .map_err(sql_err(operation))?;

            for (_, doc) in &mut docs {
                doc.labels = load_labels(conn, &doc.id, operation)?;
            }
            Ok(docs)
        },
    )
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::Validation("label must not be empty".to_string()));
    }
    Ok(())
}

impl TodoItemStore for SqliteTodoStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, ctx, item), fields(operation = "insert_one", backend = "sqlite"))]
    fn insert_one(&self, ctx: &OpContext, item: &NewTodoItem) -> Result<RecordId> {
        item.validate()?;
        let id = RecordId::generate();
        let doc = TodoDocument::new(id, item);

        run_operation(&self.conn, ctx, BACKEND, "insert_todo", |conn| {
            with_transaction(conn, |conn| {
                conn.execute(
                    "INSERT INTO todo_items (id, title, due_date, description, completed)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![doc.id, doc.title, doc.due_date, doc.description, doc.completed],
                )
                .map_err(sql_err("insert_todo"))?;
                insert_labels(conn, &doc.id, &doc.labels, "insert_todo")
            })
        })?;

        tracing::debug!(record.id = %id, "Inserted todo item");
        Ok(id)
    }

    #[instrument(skip(self, ctx), fields(operation = "find_one_by_id", backend = "sqlite", record.id = %id))]
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<TodoItem>> {
        let key = id.to_string();
        let doc = run_operation(&self.conn, ctx, BACKEND, "find_todo_by_id", |conn| {
            find_document(conn, &key, "find_todo_by_id")
        })?;
        doc.map(TodoItem::try_from).transpose()
    }

    #[instrument(skip(self, ctx), fields(operation = "find_all", backend = "sqlite"))]
    fn find_all(&self, ctx: &OpContext) -> Result<TodoCursor> {
        ctx.check("find_all")?;
        Ok(Box::new(open_cursor(
            Arc::clone(&self.conn),
            ctx.clone(),
            BACKEND,
            "find_all",
            page_loader(None, "find_all"),
            self.cursors.lease(),
        )))
    }

    #[instrument(skip(self, ctx, label), fields(operation = "find_by_label", backend = "sqlite", label = %label))]
    fn find_by_label(&self, ctx: &OpContext, label: &str) -> Result<TodoCursor> {
        ctx.check("find_by_label")?;
        Ok(Box::new(open_cursor(
            Arc::clone(&self.conn),
            ctx.clone(),
            BACKEND,
            "find_by_label",
            page_loader(Some(label.to_string()), "find_by_label"),
            self.cursors.lease(),
        )))
    }

    #[instrument(skip(self, ctx), fields(operation = "add_label", backend = "sqlite", record.id = %id))]
    fn add_label(&self, ctx: &OpContext, id: &RecordId, label: &str) -> Result<UpdateOutcome> {
        validate_label(label)?;
        let key = id.to_string();
        run_operation(&self.conn, ctx, BACKEND, "add_label", |conn| {
            // One statement: the position is computed and the row inserted
            // atomically, and an existing (item, label) pair is left alone.
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO todo_labels (item_id, label, position)
                     SELECT t.id, ?2,
                            COALESCE((SELECT MAX(position) FROM todo_labels WHERE item_id = ?1), -1) + 1
                     FROM todo_items t WHERE t.id = ?1",
                    params![key, label],
                )
                .map_err(sql_err("add_label"))?;
            if inserted > 0 {
                return Ok(UpdateOutcome::single(true, true));
            }
            let matched = item_exists(conn, &key, "add_label")?;
            Ok(UpdateOutcome::single(matched, false))
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "remove_label", backend = "sqlite", record.id = %id))]
    fn remove_label(
        &self,
        ctx: &OpContext,
        id: &RecordId,
        label: &str,
    ) -> Result<UpdateOutcome> {
        let key = id.to_string();
        run_operation(&self.conn, ctx, BACKEND, "remove_label", |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM todo_labels WHERE item_id = ?1 AND label = ?2",
                    params![key, label],
                )
                .map_err(sql_err("remove_label"))?;
            if removed > 0 {
                return Ok(UpdateOutcome::single(true, true));
            }
            let matched = item_exists(conn, &key, "remove_label")?;
            Ok(UpdateOutcome::single(matched, false))
        })
    }

    #[instrument(skip(self, ctx, item), fields(operation = "update_one_by_id", backend = "sqlite", record.id = %id))]
    fn update_one_by_id(
        &self,
        ctx: &OpContext,
        id: &RecordId,
        item: &NewTodoItem,
    ) -> Result<UpdateOutcome> {
        item.validate()?;
        let replacement = TodoDocument::new(*id, item);

        run_operation(&self.conn, ctx, BACKEND, "update_todo", |conn| {
            with_transaction(conn, |conn| {
                let Some(current) = find_document(conn, &replacement.id, "update_todo")? else {
                    return Ok(UpdateOutcome::NO_MATCH);
                };
                if current == replacement {
                    return Ok(UpdateOutcome::single(true, false));
                }

                conn.execute(
                    "UPDATE todo_items
                     SET title = ?2, due_date = ?3, description = ?4, completed = ?5
                     WHERE id = ?1",
                    params![
                        replacement.id,
                        replacement.title,
                        replacement.due_date,
                        replacement.description,
                        replacement.completed
                    ],
                )
                .map_err(sql_err("update_todo"))?;
                conn.execute(
                    "DELETE FROM todo_labels WHERE item_id = ?1",
                    params![replacement.id],
                )
                .map_err(sql_err("update_todo"))?;
                insert_labels(conn, &replacement.id, &replacement.labels, "update_todo")?;
                Ok(UpdateOutcome::single(true, true))
            })
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "delete_one_by_id", backend = "sqlite", record.id = %id))]
    fn delete_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<DeleteOutcome> {
        let key = id.to_string();
        let deleted = run_operation(&self.conn, ctx, BACKEND, "delete_todo", |conn| {
            conn.execute("DELETE FROM todo_items WHERE id = ?1", params![key])
                .map_err(sql_err("delete_todo"))
        })?;
        Ok(DeleteOutcome {
            deleted_count: deleted as u64,
        })
    }

    fn open_cursors(&self) -> usize {
        self.cursors.open_count()
    }
}
