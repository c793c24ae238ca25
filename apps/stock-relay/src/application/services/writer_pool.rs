//! Broker Writer Pool
//!
//! Workers that take validated records off the ingest queue and publish
//! them to the broker topic. A failed publish drops that one record and
//! the worker moves on.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::relay_queue::{QueueError, RelayQueue};
use super::stats::PipelineStats;
use super::worker_pool::WorkerPool;
use crate::application::ports::BrokerProducerPort;
use crate::domain::stock::StockRecord;

/// Pool label.
pub const WRITER_POOL: &str = "writer";

/// Shared handles for writer workers.
#[derive(Clone)]
pub struct WriterContext {
    /// Queue fed by the ingest endpoint.
    pub queue: Arc<RelayQueue>,
    /// Shared producer handle.
    pub producer: Arc<dyn BrokerProducerPort>,
    /// Process counters.
    pub stats: Arc<PipelineStats>,
    /// Hard-stop token.
    pub cancel: CancellationToken,
}

/// Start `size` writer workers.
#[must_use]
pub fn spawn_writer_pool(size: usize, ctx: &WriterContext) -> WorkerPool {
    WorkerPool::spawn(
        WRITER_POOL,
        (0..size).map(|worker| run_writer(worker, ctx.clone())),
    )
}

async fn run_writer(worker: usize, ctx: WriterContext) {
    tracing::debug!(worker, "Writer started");
    loop {
        let record = match ctx.queue.recv(&ctx.cancel).await {
            Ok(record) => record,
            Err(QueueError::Closed) => {
                tracing::debug!(worker, "Ingest queue drained, writer exiting");
                break;
            }
            Err(QueueError::Cancelled) => {
                tracing::debug!(worker, "Writer cancelled");
                break;
            }
        };
        publish_record(worker, record, &ctx).await;
    }
}

async fn publish_record(worker: usize, record: StockRecord, ctx: &WriterContext) {
    let wire = record.to_wire();
    tracing::info!(worker, name = %record.name, price = record.price, "Adding stock to broker");

    let started = Instant::now();
    let result = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => {
            tracing::warn!(worker, name = %record.name, "Publish abandoned on shutdown, record dropped");
            ctx.stats.record_publish_failure();
            return;
        }
        result = ctx.producer.publish(&wire.key, &wire.value) => result,
    };

    match result {
        Ok(()) => ctx.stats.record_published(started.elapsed()),
        Err(e) => {
            tracing::error!(worker, name = %record.name, error = %e, "Failed to add stock to broker");
            ctx.stats.record_publish_failure();
        }
    }
}
