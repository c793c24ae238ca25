//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ingest**: Records accepted or rejected at the HTTP edge
//! - **Broker**: Publishes, polls and decode failures
//! - **Storage**: Records handed to the sink
//! - **Workers**: Live workers per pool
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Ingest
    describe_counter!(
        "stock_relay_records_submitted_total",
        "Records accepted by the ingest endpoint"
    );
    describe_counter!(
        "stock_relay_records_rejected_total",
        "Records rejected by validation, by reason"
    );

    // Broker
    describe_counter!(
        "stock_relay_records_published_total",
        "Records published to the broker"
    );
    describe_counter!(
        "stock_relay_publish_failures_total",
        "Records dropped after a failed publish"
    );
    describe_counter!(
        "stock_relay_records_consumed_total",
        "Records decoded from the broker and queued for storage"
    );
    describe_counter!(
        "stock_relay_poll_errors_total",
        "Failed broker polls"
    );
    describe_counter!(
        "stock_relay_decode_failures_total",
        "Broker messages that could not be decoded"
    );

    // Storage
    describe_counter!(
        "stock_relay_records_stored_total",
        "Records written to the sink"
    );
    describe_counter!(
        "stock_relay_storage_failures_total",
        "Records the sink failed to store"
    );

    // Workers
    describe_gauge!(
        "stock_relay_active_workers",
        "Live workers per pool"
    );

    // Latency
    describe_histogram!(
        "stock_relay_publish_seconds",
        "Time to publish one record to the broker"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a record accepted at ingest.
pub fn record_submitted() {
    counter!("stock_relay_records_submitted_total").increment(1);
}

/// Record a validation rejection.
pub fn record_rejected(reason: &'static str) {
    counter!("stock_relay_records_rejected_total", "reason" => reason).increment(1);
}

/// Record a successful publish and its latency.
pub fn record_published(duration: Duration) {
    counter!("stock_relay_records_published_total").increment(1);
    histogram!("stock_relay_publish_seconds").record(duration.as_secs_f64());
}

/// Record a failed publish.
pub fn record_publish_failure() {
    counter!("stock_relay_publish_failures_total").increment(1);
}

/// Record a consumed record.
pub fn record_consumed() {
    counter!("stock_relay_records_consumed_total").increment(1);
}

/// Record a failed poll.
pub fn record_poll_error() {
    counter!("stock_relay_poll_errors_total").increment(1);
}

/// Record a decode failure.
pub fn record_decode_failure() {
    counter!("stock_relay_decode_failures_total").increment(1);
}

/// Record a stored record.
pub fn record_stored() {
    counter!("stock_relay_records_stored_total").increment(1);
}

/// Record a storage failure.
pub fn record_storage_failure() {
    counter!("stock_relay_storage_failures_total").increment(1);
}

/// Update the live worker count for a pool.
pub fn set_active_workers(pool: &'static str, count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("stock_relay_active_workers", "pool" => pool).set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
