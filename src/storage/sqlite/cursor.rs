//! Cursors over `SQLite` tables.
//!
//! Rows carry an autoincrement `seq`. The connection lock is held only while
//! a batch is read, so an open cursor does not block writers between fetches,
//! and every batch runs under the cursor's [`OpContext`].

use super::connection::{SqliteHandle, run_operation};
use crate::Result;
use crate::storage::OpContext;
use crate::storage::cursor::{BatchCursor, CursorLease};
use rusqlite::Connection;

/// Loads up to `limit` `(seq, document)` pairs with `seq > after`, ascending.
pub type BatchLoader<D> =
    Box<dyn FnMut(&Connection, i64, usize) -> Result<Vec<(i64, D)>> + Send>;

/// Opens a keyset cursor whose batches are read by `loader`.
pub fn open_cursor<D: 'static>(
    handle: SqliteHandle,
    ctx: OpContext,
    backend: &'static str,
    operation: &'static str,
    mut loader: BatchLoader<D>,
    lease: CursorLease,
) -> BatchCursor<D> {
    BatchCursor::new(
        operation,
        lease,
        Box::new(move |after, want| {
            run_operation(&handle, &ctx, backend, operation, |conn| {
                loader(conn, after, want)
            })
        }),
    )
}
