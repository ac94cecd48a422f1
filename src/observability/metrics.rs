//! Prometheus metrics.
//!
//! Installs the global `metrics` recorder that the store, cursor, TTL and
//! HTTP series are reported to, and serves them for scraping.

use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default port of the scrape endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are exported.
    pub enabled: bool,
    /// Address the scrape endpoint listens on.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Exports on all interfaces at `port` when `enabled`.
    #[must_use]
    pub const fn new(enabled: bool, port: u16) -> Self {
        Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::new(true, DEFAULT_METRICS_PORT)
    }
}

/// Installs the Prometheus recorder and its HTTP listener on the current
/// tokio runtime. Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if there is no runtime, the listener
/// cannot be built, or a recorder is already installed.
pub fn init(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        tracing::debug!("Metrics export disabled");
        return Ok(None);
    }

    let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::OperationFailed {
        operation: "metrics_runtime".to_string(),
        cause: e.to_string(),
    })?;

    let (recorder, exporter) = {
        let _guard = runtime.enter();
        PrometheusBuilder::new()
            .with_http_listener(config.listen_addr)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_exporter_build".to_string(),
                cause: e.to_string(),
            })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime.spawn(exporter);

    tracing::info!(address = %config.listen_addr, "Serving Prometheus metrics");
    Ok(Some(handle))
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metrics::record_operation_metrics;
    use std::time::Instant;

    #[test]
    fn test_disabled_installs_nothing() {
        let config = MetricsConfig::new(false, 0);
        assert!(init(&config).unwrap().is_none());
    }

    #[test]
    fn test_enabled_requires_runtime() {
        let err = init(&MetricsConfig::new(true, 0)).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }

    #[test]
    fn test_store_series_reach_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_operation_metrics("sqlite", "find_all", Instant::now(), "success");
        });

        let rendered = handle.render();
        assert!(rendered.contains("storage_operations_total"));
        assert!(rendered.contains("storage_operation_duration_ms"));
        assert!(rendered.contains("operation=\"find_all\""));
    }
}
