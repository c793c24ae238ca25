//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `RelayQueue`: Bounded hand-off between producers and pool workers
//! - `WorkerPool`: Fixed set of tasks with live-worker tracking
//! - Writer, reader and sink pools: the three worker loops
//! - `IngestService`: Validates and enqueues submitted records
//! - `Pipeline`: Mode-specific startup, fatal errors and graceful shutdown

mod backoff;
mod ingest;
mod pipeline;
mod reader_pool;
mod relay_queue;
mod sink_pool;
mod stats;
mod worker_pool;
mod writer_pool;

pub use backoff::{Backoff, BackoffConfig};
pub use ingest::{IngestService, SubmitError};
pub use pipeline::{
    Pipeline, PipelineMode, PipelineMonitor, PipelineSettings, PipelineStatus, PoolStatus,
};
pub use reader_pool::{DecodeFailurePolicy, READER_POOL, ReaderContext, spawn_reader_pool};
pub use relay_queue::{QueueError, RelayQueue};
pub use sink_pool::{SINK_POOL, SinkContext, spawn_sink_pool};
pub use stats::{PipelineStats, StatsSnapshot};
pub use worker_pool::WorkerPool;
pub use writer_pool::{WRITER_POOL, WriterContext, spawn_writer_pool};
