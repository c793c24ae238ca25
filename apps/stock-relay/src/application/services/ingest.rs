//! Ingest Service (Driver Port)
//!
//! Validates a submitted record and enqueues it for publishing. The call
//! returns once a writer has accepted the record (or, with a buffered
//! queue, once it is buffered); it does not wait for the broker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::relay_queue::RelayQueue;
use super::stats::PipelineStats;
use crate::domain::stock::{StockRecord, ValidationError};

/// Why a submission was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The record failed validation.
    #[error("{0}")]
    Rejected(#[from] ValidationError),
    /// The pipeline is shutting down.
    #[error("Service is shutting down")]
    Unavailable,
}

/// Entry point for records arriving over HTTP.
#[derive(Debug, Clone)]
pub struct IngestService {
    queue: Arc<RelayQueue>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl IngestService {
    /// Create an ingest service feeding `queue`.
    #[must_use]
    pub const fn new(
        queue: Arc<RelayQueue>,
        stats: Arc<PipelineStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            stats,
            cancel,
        }
    }

    /// Validate and enqueue a record.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Rejected`] on the first validation failure
    /// (nothing is enqueued) and [`SubmitError::Unavailable`] once the
    /// queue is closed or the pipeline is cancelled.
    pub async fn submit(&self, record: StockRecord) -> Result<(), SubmitError> {
        if let Err(reason) = record.validate() {
            tracing::debug!(name = %record.name, error = %reason, "Rejected stock");
            self.stats.record_rejected(&reason);
            return Err(reason.into());
        }

        let name = record.name.clone();
        self.queue
            .send(record, &self.cancel)
            .await
            .map_err(|_| SubmitError::Unavailable)?;

        self.stats.record_submitted();
        tracing::debug!(%name, "Accepted stock");
        Ok(())
    }
}
