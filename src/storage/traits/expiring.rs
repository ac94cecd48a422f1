//! Time-to-live reclamation hook.

use crate::Result;
use chrono::{DateTime, Utc};

/// A collection whose documents carry a time-to-live key.
pub trait ExpiringCollection: Send + Sync {
    /// Collection name for logs and metrics.
    fn collection_name(&self) -> &'static str;

    /// Deletes every document whose expiration is at or before `now`.
    ///
    /// Returns the number of documents removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
