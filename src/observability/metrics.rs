//! Prometheus metrics for retention runs.
//!
//! Every recorder is a no-op unless the `prometheus` feature is enabled.

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Invalid metrics configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install Prometheus exporter: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install the Prometheus exporter and its HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.listen_addr()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(listen = %addr, "Prometheus metrics endpoint started");

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

/// Record documents deleted by retention.
///
/// # Arguments
/// * `index` - The index documents were deleted from
/// * `reason` - Either "age" (TTL delete) or "shard_size" (threshold cleanup)
/// * `count` - The number of documents deleted
pub fn record_retention_deletion(index: &str, reason: &'static str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_deletions_total",
            "index" => index.to_string(),
            "reason" => reason
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (index, reason, count);
    }
}

/// Record the outcome of one shard-size evaluation.
pub fn record_retention_evaluation(index: &str, outcome: &'static str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_evaluations_total",
            "index" => index.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (index, outcome);
    }
}

/// Record the size of an index's largest shard copy.
pub fn record_largest_shard_bytes(index: &str, bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!(
            "retention_largest_shard_bytes",
            "index" => index.to_string()
        )
        .set(bytes as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (index, bytes);
    }
}

/// Record a failed retention job.
pub fn record_retention_error(index: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_errors_total",
            "index" => index.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = index;
    }
}
