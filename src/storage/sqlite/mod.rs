//! Shared `SQLite` infrastructure for the record stores.
//!
//! - `connection`: opening and configuring connections, lock acquisition
//!   with poison recovery, context-aware execution, transactions
//! - `cursor`: keyset cursors whose batches read under the connection lock
//!
//! Each store owns one `Arc<Mutex<Connection>>`; cursors share it and take
//! the lock only for the duration of a batch fetch.

mod connection;
mod cursor;

pub use connection::{
    PROGRESS_HANDLER_OPS, SqliteHandle, acquire_lock, configure_connection, lock_connection,
    open_connection, run_operation, sql_err, with_transaction,
};
pub use cursor::{BatchLoader, open_cursor};
