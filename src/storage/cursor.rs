//! Result handles.
//!
//! A query returns a [`DocumentCursor`]: a lazily-enumerated, single-pass
//! handle over stored documents. Cursors hold a [`CursorLease`] from their
//! store's [`CursorTracker`] until closed or dropped, which makes leaked
//! handles observable through `open_cursors()` on every store.

use crate::{Error, Result};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Documents fetched per round trip when the caller sets no batch size.
pub const DEFAULT_BATCH_SIZE: usize = 101;

/// A single-pass handle over the documents matching a query.
///
/// Enumeration errors (transport failure, cancellation, a closed cursor)
/// come from [`advance`](Self::advance). Turning a document into a record is
/// a separate step so decode failures stay distinguishable.
pub trait DocumentCursor: Send {
    /// Stored representation yielded by this cursor.
    type Document;

    /// Caps the total number of documents this cursor will ever yield.
    ///
    /// Backends size their fetches so nothing beyond the cap is read.
    fn set_limit(&mut self, limit: usize);

    /// Sets how many documents are fetched per round trip.
    fn set_batch_size(&mut self, batch_size: usize);

    /// Returns the next document, or `None` once exhausted or at the limit.
    fn advance(&mut self) -> Result<Option<Self::Document>>;

    /// Releases the cursor. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` once the cursor has been closed.
    fn is_closed(&self) -> bool;
}

impl<C: DocumentCursor + ?Sized> DocumentCursor for Box<C> {
    type Document = C::Document;

    fn set_limit(&mut self, limit: usize) {
        (**self).set_limit(limit);
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        (**self).set_batch_size(batch_size);
    }

    fn advance(&mut self) -> Result<Option<Self::Document>> {
        (**self).advance()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Counts the cursors a store currently has open.
#[derive(Debug, Clone, Default)]
pub struct CursorTracker {
    open: Arc<AtomicUsize>,
}

impl CursorTracker {
    /// Creates a tracker with no open cursors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly opened cursor.
    #[must_use]
    pub fn lease(&self) -> CursorLease {
        self.open.fetch_add(1, Ordering::AcqRel);
        metrics::gauge!("storage_open_cursors").increment(1.0);
        CursorLease {
            open: Arc::clone(&self.open),
        }
    }

    /// Returns the number of cursors not yet released.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}

/// Proof that a cursor is open. Dropping it releases the slot.
#[derive(Debug)]
pub struct CursorLease {
    open: Arc<AtomicUsize>,
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        metrics::gauge!("storage_open_cursors").decrement(1.0);
    }
}

/// Fetches up to `want` `(seq, document)` pairs with `seq > after`, ascending.
pub type BatchFetch<D> = Box<dyn FnMut(i64, usize) -> Result<Vec<(i64, D)>> + Send>;

/// Keyset-paginated cursor over documents ordered by insertion sequence.
///
/// Each round trip asks the fetcher for `seq > last_seen`, at most
/// `min(batch_size, remaining limit)` rows, so nothing past the limit is read.
/// Backends differ only in the fetcher they supply.
pub struct BatchCursor<D> {
    operation: &'static str,
    fetch: BatchFetch<D>,
    buffer: VecDeque<D>,
    last_seq: i64,
    batch_size: usize,
    limit: Option<usize>,
    yielded: usize,
    exhausted: bool,
    lease: Option<CursorLease>,
}

impl<D> BatchCursor<D> {
    /// Opens a cursor. Nothing is fetched until the first `advance`.
    pub fn new(operation: &'static str, lease: CursorLease, fetch: BatchFetch<D>) -> Self {
        Self {
            operation,
            fetch,
            buffer: VecDeque::new(),
            last_seq: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            yielded: 0,
            exhausted: false,
            lease: Some(lease),
        }
    }

    fn remaining(&self) -> usize {
        self.limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.yielded))
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let want = self.batch_size.min(self.remaining());
        if want == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let rows = (self.fetch)(self.last_seq, want)?;
        if rows.len() < want {
            self.exhausted = true;
        }
        for (seq, document) in rows {
            self.last_seq = seq;
            self.buffer.push_back(document);
        }
        Ok(())
    }
}

impl<D: Send> DocumentCursor for BatchCursor<D> {
    type Document = D;

    fn set_limit(&mut self, limit: usize) {
        self.limit = Some(limit);
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    fn advance(&mut self) -> Result<Option<D>> {
        if self.lease.is_none() {
            return Err(Error::persistence(self.operation, "cursor is closed"));
        }
        if self.remaining() == 0 {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch()?;
        }
        let next = self.buffer.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }

    fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.exhausted = true;
        self.lease = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

/// Scoped ownership of a cursor.
///
/// [`finish`](Self::finish) closes the cursor and reports close errors; any
/// other exit (early return, `?`, panic) closes it on drop.
pub struct CursorGuard<C: DocumentCursor> {
    cursor: C,
    released: bool,
}

impl<C: DocumentCursor> CursorGuard<C> {
    /// Takes ownership of `cursor`.
    pub const fn new(cursor: C) -> Self {
        Self {
            cursor,
            released: false,
        }
    }

    /// Closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns whatever the cursor's `close` returns.
    pub fn finish(mut self) -> Result<()> {
        self.released = true;
        self.cursor.close()
    }
}

impl<C: DocumentCursor> Deref for CursorGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.cursor
    }
}

impl<C: DocumentCursor> DerefMut for CursorGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.cursor
    }
}

impl<C: DocumentCursor> Drop for CursorGuard<C> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.cursor.close();
        }
    }
}
