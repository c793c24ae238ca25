//! Pipeline Counters
//!
//! Lock-free counters shared by every worker. Each recorder also feeds
//! the Prometheus facade so `/health` and `/metrics` agree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::domain::stock::ValidationError;
use crate::infrastructure::metrics;

/// Running totals for one process.
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    consumed: AtomicU64,
    poll_errors: AtomicU64,
    decode_failures: AtomicU64,
    stored: AtomicU64,
    storage_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records accepted at ingest.
    pub submitted: u64,
    /// Records rejected by validation.
    pub rejected: u64,
    /// Records published to the broker.
    pub published: u64,
    /// Publishes that failed.
    pub publish_failures: u64,
    /// Records consumed from the broker.
    pub consumed: u64,
    /// Failed polls.
    pub poll_errors: u64,
    /// Undecodable messages.
    pub decode_failures: u64,
    /// Records written to the sink.
    pub stored: u64,
    /// Failed sink writes.
    pub storage_failures: u64,
}

impl PipelineStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_submitted();
    }

    pub(crate) fn record_rejected(&self, reason: &ValidationError) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_rejected(reason.as_str());
    }

    pub(crate) fn record_published(&self, elapsed: Duration) {
        self.published.fetch_add(1, Ordering::Relaxed);
        metrics::record_published(elapsed);
    }

    pub(crate) fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_publish_failure();
    }

    pub(crate) fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        metrics::record_consumed();
    }

    pub(crate) fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_poll_error();
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_decode_failure();
    }

    pub(crate) fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
        metrics::record_stored();
    }

    pub(crate) fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_storage_failure();
    }

    /// Copy the current totals.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = PipelineStats::new();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_rejected(&ValidationError::EmptyName);
        stats.record_published(Duration::from_millis(1));
        stats.record_stored();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.published, 1);
        assert_eq!(snapshot.stored, 1);
        assert_eq!(snapshot.consumed, 0);
    }
}
