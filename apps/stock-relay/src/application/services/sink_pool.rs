//! Storage Sink Pool
//!
//! Workers that drain decoded records into the record sink. Storage
//! failures are logged and counted; the record is not retried.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::relay_queue::{QueueError, RelayQueue};
use super::stats::PipelineStats;
use super::worker_pool::WorkerPool;
use crate::application::ports::RecordSinkPort;

/// Pool label.
pub const SINK_POOL: &str = "sink";

/// Shared handles for sink workers.
#[derive(Clone)]
pub struct SinkContext {
    /// Queue fed by the reader pool.
    pub queue: Arc<RelayQueue>,
    /// Destination for records.
    pub sink: Arc<dyn RecordSinkPort>,
    /// Process counters.
    pub stats: Arc<PipelineStats>,
    /// Hard-stop token.
    pub cancel: CancellationToken,
}

/// Start `size` sink workers.
#[must_use]
pub fn spawn_sink_pool(size: usize, ctx: &SinkContext) -> WorkerPool {
    WorkerPool::spawn(
        SINK_POOL,
        (0..size).map(|worker| run_sink(worker, ctx.clone())),
    )
}

async fn run_sink(worker: usize, ctx: SinkContext) {
    loop {
        let record = match ctx.queue.recv(&ctx.cancel).await {
            Ok(record) => record,
            Err(QueueError::Closed | QueueError::Cancelled) => break,
        };
        let name = record.name.clone();

        let stored = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                tracing::warn!(worker, %name, "Store abandoned on shutdown, record dropped");
                break;
            }
            stored = ctx.sink.store(record) => stored,
        };

        match stored {
            Ok(()) => ctx.stats.record_stored(),
            Err(e) => {
                tracing::error!(worker, %name, error = %e, "Failed to store stock");
                ctx.stats.record_storage_failure();
            }
        }
    }
    tracing::debug!(worker, "Sink worker stopped");
}
