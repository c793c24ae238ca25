//! Pipeline Lifecycle
//!
//! Builds the pools for one service mode, exposes a read-only monitor for
//! health reporting, surfaces fatal errors from workers and runs the
//! two-phase shutdown:
//!
//! 1. Stop intake (cancel readers, close the relay queue).
//! 2. Let consumers drain what is already queued, up to the shutdown
//!    timeout, then cancel whatever is still running.
//!
//! ```text
//! ingest:     submit ──▶ RelayQueue ──▶ writer pool ──▶ broker
//! aggregate:  broker ──▶ reader pool ──▶ RelayQueue ──▶ sink pool ──▶ sink
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffConfig;
use super::ingest::IngestService;
use super::reader_pool::{DecodeFailurePolicy, ReaderContext, spawn_reader_pool};
use super::relay_queue::RelayQueue;
use super::sink_pool::{SinkContext, spawn_sink_pool};
use super::stats::{PipelineStats, StatsSnapshot};
use super::worker_pool::WorkerPool;
use super::writer_pool::{WriterContext, spawn_writer_pool};
use crate::application::error::FatalError;
use crate::application::ports::{AlertPort, BrokerClientPort, RecordSinkPort, notify_or_log};

/// Fatal errors buffered between workers and the coordinator.
const FATAL_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Mode and Settings
// =============================================================================

/// Which half of the relay this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// HTTP ingest publishing to the broker.
    Ingest,
    /// Broker consumption into the record sink.
    Aggregate,
}

impl PipelineMode {
    /// Mode name as configured.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Aggregate => "aggregate",
        }
    }

    /// Default relay queue capacity for this mode.
    #[must_use]
    pub const fn default_queue_capacity(self) -> usize {
        match self {
            Self::Ingest => 0,
            Self::Aggregate => 1,
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingest" | "producer" => Ok(Self::Ingest),
            "aggregate" | "aggregator" | "consumer" => Ok(Self::Aggregate),
            other => Err(format!("unknown service mode '{other}'")),
        }
    }
}

/// Pool sizes and timing for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Service mode.
    pub mode: PipelineMode,
    /// Writer pool size (ingest).
    pub writer_workers: usize,
    /// Reader pool size (aggregate).
    pub reader_workers: usize,
    /// Sink pool size (aggregate).
    pub sink_workers: usize,
    /// Relay queue capacity; `0` is a rendezvous.
    pub queue_capacity: usize,
    /// Reader handling of undecodable messages.
    pub decode_failure: DecodeFailurePolicy,
    /// Reader poll backoff.
    pub backoff: BackoffConfig,
    /// How long shutdown waits for queued work.
    pub shutdown_timeout: Duration,
}

impl PipelineSettings {
    /// Defaults for `mode`: five workers per pool.
    #[must_use]
    pub fn for_mode(mode: PipelineMode) -> Self {
        Self {
            mode,
            writer_workers: 5,
            reader_workers: 5,
            sink_workers: 5,
            queue_capacity: mode.default_queue_capacity(),
            decode_failure: DecodeFailurePolicy::default(),
            backoff: BackoffConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    fn check_pool_sizes(&self) -> Result<(), FatalError> {
        let pools: &[(&str, usize)] = match self.mode {
            PipelineMode::Ingest => &[("writer_workers", self.writer_workers)],
            PipelineMode::Aggregate => &[
                ("reader_workers", self.reader_workers),
                ("sink_workers", self.sink_workers),
            ],
        };
        match pools.iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(FatalError::Config(format!(
                "{name} must be at least 1 in {} mode",
                self.mode
            ))),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Live view of a running pipeline, shared with the HTTP layer.
#[derive(Debug)]
pub struct PipelineMonitor {
    mode: PipelineMode,
    queue: Arc<RelayQueue>,
    stats: Arc<PipelineStats>,
    pools: Vec<PoolCounter>,
    stopping: AtomicBool,
}

#[derive(Debug)]
struct PoolCounter {
    name: &'static str,
    size: usize,
    active: Arc<AtomicUsize>,
}

/// Point-in-time pool status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Pool label.
    pub name: &'static str,
    /// Workers spawned.
    pub size: usize,
    /// Workers still running.
    pub active: usize,
}

/// Point-in-time pipeline status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// Service mode.
    pub mode: PipelineMode,
    /// Whether shutdown has begun.
    pub stopping: bool,
    /// Records waiting in the relay queue.
    pub queue_depth: usize,
    /// Relay queue capacity.
    pub queue_capacity: usize,
    /// Per-pool worker counts.
    pub pools: Vec<PoolStatus>,
    /// Running totals.
    pub stats: StatsSnapshot,
}

impl PipelineMonitor {
    /// Service mode.
    #[must_use]
    pub const fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Ready while not stopping and every pool has a live worker.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.is_stopping()
            && self
                .pools
                .iter()
                .all(|pool| pool.size == 0 || pool.active.load(Ordering::SeqCst) > 0)
    }

    /// Copy the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            mode: self.mode,
            stopping: self.is_stopping(),
            queue_depth: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            pools: self
                .pools
                .iter()
                .map(|pool| PoolStatus {
                    name: pool.name,
                    size: pool.size,
                    active: pool.active.load(Ordering::SeqCst),
                })
                .collect(),
            stats: self.stats.snapshot(),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// A running ingest or aggregate pipeline.
#[derive(Debug)]
pub struct Pipeline {
    settings: PipelineSettings,
    queue: Arc<RelayQueue>,
    monitor: Arc<PipelineMonitor>,
    ingest: Option<IngestService>,
    readers: Option<WorkerPool>,
    writers: Option<WorkerPool>,
    sinks: Option<WorkerPool>,
    reader_cancel: CancellationToken,
    worker_cancel: CancellationToken,
    fatal_tx: mpsc::Sender<FatalError>,
    fatal_rx: mpsc::Receiver<FatalError>,
}

impl Pipeline {
    /// Acquire broker handles and start the pools for `settings.mode`.
    ///
    /// `sink` is only used in aggregate mode.
    ///
    /// # Errors
    ///
    /// Returns [`FatalError::Config`] if a pool the mode needs has no
    /// workers, and [`FatalError::BrokerUnavailable`] if broker handles
    /// cannot be built or the broker is unreachable. No workers are left
    /// running on error.
    pub async fn start(
        settings: PipelineSettings,
        client: &dyn BrokerClientPort,
        sink: Arc<dyn RecordSinkPort>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, FatalError> {
        settings.check_pool_sizes()?;
        let (fatal_tx, fatal_rx) = mpsc::channel(FATAL_CHANNEL_CAPACITY);
        let queue = Arc::new(RelayQueue::new(settings.queue_capacity));
        let worker_cancel = CancellationToken::new();
        let reader_cancel = worker_cancel.child_token();

        let mut ingest = None;
        let mut readers = None;
        let mut writers = None;
        let mut sinks = None;

        // Both modes prove the broker is reachable before any worker starts.
        let producer = client
            .producer()
            .map_err(|e| FatalError::BrokerUnavailable(e.to_string()))?;
        producer
            .check_connection()
            .await
            .map_err(|e| FatalError::BrokerUnavailable(e.to_string()))?;

        match settings.mode {
            PipelineMode::Ingest => {
                let ctx = WriterContext {
                    queue: Arc::clone(&queue),
                    producer,
                    stats: Arc::clone(&stats),
                    cancel: worker_cancel.clone(),
                };
                writers = Some(spawn_writer_pool(settings.writer_workers, &ctx));
                ingest = Some(IngestService::new(
                    Arc::clone(&queue),
                    Arc::clone(&stats),
                    worker_cancel.clone(),
                ));
            }
            PipelineMode::Aggregate => {
                let consumers = (0..settings.reader_workers)
                    .map(|_| client.consumer())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| FatalError::BrokerUnavailable(e.to_string()))?;

                let sink_ctx = SinkContext {
                    queue: Arc::clone(&queue),
                    sink,
                    stats: Arc::clone(&stats),
                    cancel: worker_cancel.clone(),
                };
                sinks = Some(spawn_sink_pool(settings.sink_workers, &sink_ctx));

                let reader_ctx = ReaderContext {
                    queue: Arc::clone(&queue),
                    stats: Arc::clone(&stats),
                    decode_policy: settings.decode_failure,
                    backoff: settings.backoff.clone(),
                    fatal_tx: fatal_tx.clone(),
                    cancel: reader_cancel.clone(),
                    abort: worker_cancel.clone(),
                };
                readers = Some(spawn_reader_pool(consumers, &reader_ctx));
            }
        }

        let pools = [&readers, &writers, &sinks]
            .into_iter()
            .flatten()
            .map(|pool| PoolCounter {
                name: pool.name(),
                size: pool.size(),
                active: pool.active_counter(),
            })
            .collect();
        let monitor = Arc::new(PipelineMonitor {
            mode: settings.mode,
            queue: Arc::clone(&queue),
            stats,
            pools,
            stopping: AtomicBool::new(false),
        });

        tracing::info!(
            mode = %settings.mode,
            queue_capacity = settings.queue_capacity,
            "Pipeline started"
        );

        Ok(Self {
            settings,
            queue,
            monitor,
            ingest,
            readers,
            writers,
            sinks,
            reader_cancel,
            worker_cancel,
            fatal_tx,
            fatal_rx,
        })
    }

    /// Service mode.
    #[must_use]
    pub const fn mode(&self) -> PipelineMode {
        self.settings.mode
    }

    /// Ingest entry point. `None` in aggregate mode.
    #[must_use]
    pub fn ingest_service(&self) -> Option<IngestService> {
        self.ingest.clone()
    }

    /// Shared status view.
    #[must_use]
    pub fn monitor(&self) -> Arc<PipelineMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Sender for components outside the pools that need to stop the
    /// process (the HTTP server, for one).
    #[must_use]
    pub fn fatal_sender(&self) -> mpsc::Sender<FatalError> {
        self.fatal_tx.clone()
    }

    /// Wait for the next fatal error. Pends forever if none occurs.
    pub async fn next_fatal(&mut self) -> Option<FatalError> {
        self.fatal_rx.recv().await
    }

    /// Run until `signal` completes or a fatal error arrives, then shut
    /// down.
    ///
    /// A fatal error is alerted once, before shutdown starts, so the alert
    /// does not wait for the drain.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that stopped the pipeline.
    pub async fn run_until<S>(
        mut self,
        signal: S,
        alerter: &dyn AlertPort,
    ) -> Result<(), FatalError>
    where
        S: Future<Output = ()>,
    {
        let fatal = tokio::select! {
            () = signal => None,
            fatal = self.next_fatal() => fatal,
        };

        if let Some(error) = &fatal {
            tracing::error!(error = %error, "Fatal error, shutting down");
            notify_or_log(alerter, error).await;
        }

        self.shutdown().await;
        fatal.map_or(Ok(()), Err)
    }

    /// Stop intake, drain queued work, then cancel what remains.
    ///
    /// Returns `true` if every worker finished within the shutdown
    /// timeout.
    pub async fn shutdown(mut self) -> bool {
        let timeout = self.settings.shutdown_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        self.monitor.stopping.store(true, Ordering::SeqCst);
        tracing::info!(
            mode = %self.settings.mode,
            timeout_secs = timeout.as_secs(),
            queued = self.queue.len(),
            "Shutting down pipeline"
        );

        // Intake first: readers stop polling, then the queue stops accepting.
        self.reader_cancel.cancel();
        let mut drained = true;
        if let Some(readers) = self.readers.as_mut() {
            drained &= join_until(readers, deadline, &self.worker_cancel).await;
        }
        self.queue.close();

        for pool in [self.writers.as_mut(), self.sinks.as_mut()]
            .into_iter()
            .flatten()
        {
            drained &= join_until(pool, deadline, &self.worker_cancel).await;
        }
        self.worker_cancel.cancel();

        if drained {
            tracing::info!("Pipeline drained");
        } else {
            tracing::warn!(dropped = self.queue.len(), "Pipeline stopped before draining");
        }
        drained
    }
}

async fn join_until(
    pool: &mut WorkerPool,
    deadline: tokio::time::Instant,
    cancel: &CancellationToken,
) -> bool {
    if tokio::time::timeout_at(deadline, pool.join()).await.is_ok() {
        return true;
    }
    tracing::warn!(
        pool = pool.name(),
        remaining = pool.active(),
        "Shutdown timeout reached, cancelling workers"
    );
    cancel.cancel();
    pool.join().await;
    false
}
