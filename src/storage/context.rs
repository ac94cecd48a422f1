//! Per-call cancellation and deadline context.
//!
//! Every store operation takes an [`OpContext`]. Stores check it before
//! touching storage and the `SQLite` backend keeps checking it while a
//! statement runs, so a cancelled or expired call fails promptly with a
//! [`PersistenceErrorKind::Cancelled`] or
//! [`PersistenceErrorKind::DeadlineExceeded`] error.

use crate::{Error, PersistenceErrorKind, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancellation signal and optional deadline for a store call.
///
/// Cloning shares the cancellation flag, so a clone handed to a blocking
/// worker observes a `cancel()` made through the original.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Signals cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once `cancel()` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `true` if the call should stop.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Fails if the context is cancelled or expired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] with a cancellation or deadline kind.
    pub fn check(&self, operation: &str) -> Result<()> {
        match self.interruption(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Builds the error describing why this context stopped, if it has.
    #[must_use]
    pub fn interruption(&self, operation: &str) -> Option<Error> {
        if self.is_cancelled() {
            return Some(Error::Persistence {
                operation: operation.to_string(),
                kind: PersistenceErrorKind::Cancelled,
                cause: "operation cancelled by caller".to_string(),
            });
        }
        if self.is_expired() {
            return Some(Error::Persistence {
                operation: operation.to_string(),
                kind: PersistenceErrorKind::DeadlineExceeded,
                cause: "operation deadline exceeded".to_string(),
            });
        }
        None
    }

    /// Returns a guard that cancels this context when dropped.
    ///
    /// Request handlers hold one so that a dropped request future cancels the
    /// blocking store call it started.
    #[must_use]
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            ctx: Some(self.clone()),
        }
    }
}

/// Cancels its context on drop unless disarmed.
#[derive(Debug)]
pub struct CancelOnDrop {
    ctx: Option<OpContext>,
}

impl CancelOnDrop {
    /// Lets the context outlive the guard without being cancelled.
    pub fn disarm(mut self) {
        self.ctx = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }
}
