//! Time-to-live monitor.
//!
//! Document stores with native TTL indexes reclaim expired documents on a
//! background pass roughly once a minute. [`TtlMonitor`] gives the embedded
//! backends the same behaviour: it periodically calls
//! [`ExpiringCollection::purge_expired`] on the blocking pool.
//!
//! # Example
//!
//! ```rust,ignore
//! use todo_list_service::storage::{SqliteArticleStore, TtlMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let articles = Arc::new(SqliteArticleStore::in_memory()?);
//! let monitor = TtlMonitor::spawn(articles, Duration::from_secs(60));
//! // ... serve traffic ...
//! monitor.shutdown().await;
//! ```

use crate::Result;
use crate::storage::traits::ExpiringCollection;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default interval between reclamation passes.
pub const DEFAULT_TTL_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that purges expired documents on a fixed interval.
pub struct TtlMonitor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TtlMonitor {
    /// Starts the monitor on the current tokio runtime.
    ///
    /// The first pass runs one `interval` after start.
    #[must_use]
    pub fn spawn(collection: Arc<dyn ExpiringCollection>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let interval = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                collection = collection.collection_name(),
                interval_secs = interval.as_secs(),
                "TTL monitor started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let collection = Arc::clone(&collection);
                        match tokio::task::spawn_blocking(move || run_once(collection.as_ref())).await {
                            Ok(_) => {},
                            Err(e) => warn!(error = %e, "TTL pass panicked"),
                        }
                    },
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    },
                }
            }

            info!(collection = collection.collection_name(), "TTL monitor stopped");
        });

        Self { stop, task }
    }

    /// Stops the monitor and waits for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "TTL monitor task failed");
        }
    }
}

/// Runs a single reclamation pass and logs its outcome.
///
/// # Errors
///
/// Returns the collection's purge error.
pub fn run_once(collection: &dyn ExpiringCollection) -> Result<usize> {
    let start = Instant::now();
    let name = collection.collection_name();
    let result = collection.purge_expired(Utc::now());

    match &result {
        Ok(0) => debug!(collection = name, "TTL pass found nothing to reclaim"),
        Ok(removed) => {
            info!(collection = name, removed, "TTL pass reclaimed expired documents");
            metrics::counter!("ttl_documents_reclaimed_total", "collection" => name)
                .increment(*removed as u64);
        },
        Err(e) => warn!(collection = name, error = %e, "TTL pass failed"),
    }
    metrics::histogram!("ttl_pass_duration_ms", "collection" => name)
        .record(start.elapsed().as_secs_f64() * 1000.0);
    result
}
