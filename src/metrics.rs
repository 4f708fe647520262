//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a cache hit
pub fn record_cache_hit(model: &str) {
    metrics::counter!("model_manager_cache_hits_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record a cache miss
pub fn record_cache_miss(model: &str) {
    metrics::counter!("model_manager_cache_misses_total",
        "model" => model.to_string()
    )
    .increment(1);
}

/// Record an evicted or expired entry
pub fn record_eviction(model: &str, reason: &'static str) {
    metrics::counter!("model_manager_evictions_total",
        "model" => model.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a finished download attempt
pub fn record_download(model: &str, outcome: &'static str) {
    metrics::counter!("model_manager_downloads_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an acquisition that ended unavailable
pub fn record_acquisition_failure(model: &str, category: &'static str) {
    metrics::counter!("model_manager_acquisition_failures_total",
        "model" => model.to_string(),
        "category" => category
    )
    .increment(1);
}

/// Update total cached bytes gauge
pub fn update_cache_bytes(bytes: u64) {
    metrics::gauge!("model_manager_cache_bytes").set(bytes as f64);
}
