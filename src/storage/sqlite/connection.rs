//! Connection handling for `SQLite` stores.

use crate::storage::OpContext;
use crate::storage::metrics::{record_operation_metrics, status_label};
use crate::{Error, PersistenceErrorKind, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Virtual machine instructions between cancellation checks while a
/// statement runs.
pub const PROGRESS_HANDLER_OPS: i32 = 1_000;

/// Shared connection handle.
pub type SqliteHandle = Arc<Mutex<Connection>>;

/// Opens a file-backed connection, or an in-memory one when `path` is `None`.
///
/// # Errors
///
/// Returns [`Error::Persistence`] if the database cannot be opened or
/// configured.
pub fn open_connection(path: Option<&Path>) -> Result<SqliteHandle> {
    let conn = match path {
        Some(path) => Connection::open(path).map_err(sql_err("open_sqlite"))?,
        None => Connection::open_in_memory().map_err(sql_err("open_sqlite_in_memory"))?,
    };
    configure_connection(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Acquires a lock, recovering from poisoning.
///
/// Connections should go through [`lock_connection`], which also closes a
/// transaction the panicking holder left open.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Locks the shared connection.
///
/// A holder that panicked inside [`with_transaction`] leaves the connection
/// in an open transaction. That transaction is rolled back here, so its
/// partial writes are discarded and the next `BEGIN` succeeds.
pub fn lock_connection(handle: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    let conn = acquire_lock(handle);
    if !conn.is_autocommit() {
        tracing::warn!("SQLite connection left inside a transaction, rolling back");
        conn.progress_handler(0, None::<fn() -> bool>);
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            tracing::error!(error = %e, "Failed to roll back abandoned transaction");
        }
    }
    conn
}

/// Configures a connection for concurrent use.
///
/// - **WAL mode**: concurrent readers with a single writer (file databases)
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention
/// - **`foreign_keys`**: required for cascading deletes of set members
///
/// # Errors
///
/// Returns [`Error::Persistence`] if foreign keys cannot be enabled.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode answers with the resulting mode, and in-memory databases
    // stay in "memory" mode, so these results are not checked.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(sql_err("enable_foreign_keys"))
}

/// Maps a rusqlite error into a backend persistence error for `operation`.
pub fn sql_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::persistence(operation, e)
}

/// Runs `f` against the locked connection under `ctx`.
///
/// The context is checked before and after waiting for the lock, and a
/// progress handler interrupts the running statement once it is cancelled
/// or expired. Backend failures that coincide with an interrupted context
/// are reported as cancellation or deadline errors. Latency and status are
/// recorded per `backend`/`operation`.
pub fn run_operation<T>(
    handle: &Mutex<Connection>,
    ctx: &OpContext,
    backend: &'static str,
    operation: &'static str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    let result = (|| {
        ctx.check(operation)?;
        let conn = lock_connection(handle);
        ctx.check(operation)?;

        let _scope = InterruptScope::install(&conn, ctx);
        f(&conn).map_err(|err| classify(ctx, operation, err))
    })();

    record_operation_metrics(backend, operation, start, status_label(&result));
    result
}

/// Runs `f` inside an `IMMEDIATE` transaction.
///
/// Commits on success. On failure the transaction is rolled back with the
/// progress handler removed, so an interrupted call cannot leave a partial
/// write behind.
pub fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(sql_err("begin_transaction"))?;

    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")
            .map_err(sql_err("commit_transaction"))?;
        Ok(value)
    });

    if result.is_err() && !conn.is_autocommit() {
        conn.progress_handler(0, None::<fn() -> bool>);
        let _ = conn.execute_batch("ROLLBACK");
    }
    result
}

fn classify(ctx: &OpContext, operation: &str, err: Error) -> Error {
    match (&err, ctx.interruption(operation)) {
        (
            Error::Persistence {
                kind: PersistenceErrorKind::Backend,
                ..
            },
            Some(interrupted),
        ) => interrupted,
        _ => err,
    }
}

/// Keeps a progress handler installed for the lifetime of the scope.
struct InterruptScope<'c> {
    conn: &'c Connection,
}

impl<'c> InterruptScope<'c> {
    fn install(conn: &'c Connection, ctx: &OpContext) -> Self {
        let ctx = ctx.clone();
        conn.progress_handler(PROGRESS_HANDLER_OPS, Some(move || ctx.is_done()));
        Self { conn }
    }
}

impl Drop for InterruptScope<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
