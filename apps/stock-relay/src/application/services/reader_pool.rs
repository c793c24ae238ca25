//! Broker Reader Pool
//!
//! Each reader owns one consumer handle in the shared consumer group,
//! polls it, decodes every message into a [`StockRecord`] and hands it to
//! the sink queue. Poll failures back off and retry. Decode failures
//! follow the configured [`DecodeFailurePolicy`].

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::backoff::{Backoff, BackoffConfig};
use super::relay_queue::{QueueError, RelayQueue};
use super::stats::PipelineStats;
use super::worker_pool::WorkerPool;
use crate::application::error::FatalError;
use crate::application::ports::{BrokerConsumerPort, BrokerMessage};
use crate::domain::stock::{StockRecord, decode_message};

/// Pool label.
pub const READER_POOL: &str = "reader";

/// What a reader does with a message it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Report a fatal error and stop the process.
    #[default]
    Fatal,
    /// Log the message position and continue.
    Skip,
}

impl DecodeFailurePolicy {
    /// Policy name as configured.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Skip => "skip",
        }
    }
}

impl FromStr for DecodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(Self::Fatal),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown decode failure policy '{other}'")),
        }
    }
}

/// Shared handles for reader workers.
#[derive(Clone)]
pub struct ReaderContext {
    /// Queue drained by the sink pool.
    pub queue: Arc<RelayQueue>,
    /// Process counters.
    pub stats: Arc<PipelineStats>,
    /// Decode failure handling.
    pub decode_policy: DecodeFailurePolicy,
    /// Poll retry tuning.
    pub backoff: BackoffConfig,
    /// Channel to the lifecycle coordinator.
    pub fatal_tx: mpsc::Sender<FatalError>,
    /// Stops polling. A record already read is still handed to the queue.
    pub cancel: CancellationToken,
    /// Hard stop; abandons a record waiting for queue space.
    pub abort: CancellationToken,
}

/// Start one reader per consumer handle.
#[must_use]
pub fn spawn_reader_pool(
    consumers: Vec<Box<dyn BrokerConsumerPort>>,
    ctx: &ReaderContext,
) -> WorkerPool {
    WorkerPool::spawn(
        READER_POOL,
        consumers
            .into_iter()
            .enumerate()
            .map(|(worker, consumer)| run_reader(worker, consumer, ctx.clone())),
    )
}

async fn run_reader(worker: usize, consumer: Box<dyn BrokerConsumerPort>, ctx: ReaderContext) {
    tracing::debug!(worker, "Reader started");
    let mut backoff = Backoff::new(ctx.backoff.clone());

    loop {
        let polled = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            polled = consumer.poll() => polled,
        };

        let message = match polled {
            Ok(message) => {
                backoff.reset();
                message
            }
            Err(e) => {
                ctx.stats.record_poll_error();
                let delay = backoff.next_delay();
                tracing::warn!(
                    worker,
                    error = %e,
                    failures = backoff.failures(),
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Error while reading message"
                );
                tokio::select! {
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => continue,
                }
            }
        };

        let Some(record) = decode_or_report(worker, &message, &ctx) else {
            match ctx.decode_policy {
                DecodeFailurePolicy::Skip => continue,
                DecodeFailurePolicy::Fatal => break,
            }
        };

        tracing::debug!(worker, name = %record.name, price = record.price, "Message received");
        match ctx.queue.send(record, &ctx.abort).await {
            Ok(()) => ctx.stats.record_consumed(),
            Err(QueueError::Closed) => {
                tracing::warn!(worker, "Sink queue closed, reader exiting");
                break;
            }
            Err(QueueError::Cancelled) => break,
        }
    }

    tracing::debug!(worker, "Reader stopped");
}

fn decode_or_report(
    worker: usize,
    message: &BrokerMessage,
    ctx: &ReaderContext,
) -> Option<StockRecord> {
    let source = match decode_message(&message.key, &message.value) {
        Ok(record) => return Some(record),
        Err(source) => source,
    };

    ctx.stats.record_decode_failure();
    match ctx.decode_policy {
        DecodeFailurePolicy::Skip => {
            tracing::warn!(
                worker,
                partition = message.partition,
                offset = message.offset,
                error = %source,
                "Skipping malformed message"
            );
        }
        DecodeFailurePolicy::Fatal => {
            let fatal = FatalError::Decode {
                worker,
                partition: message.partition,
                offset: message.offset,
                source,
            };
            tracing::error!(error = %fatal, "Malformed message, stopping");
            // A full channel already holds a fatal error for the coordinator.
            let _ = ctx.fatal_tx.try_send(fatal);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use test_case::test_case;

    use super::*;
    use crate::application::ports::ReadError;

    /// Consumer replaying a script, then parking until cancelled.
    struct ScriptedConsumer {
        script: Mutex<VecDeque<Result<BrokerMessage, ReadError>>>,
    }

    impl ScriptedConsumer {
        fn boxed(script: Vec<Result<BrokerMessage, ReadError>>) -> Box<dyn BrokerConsumerPort> {
            Box::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl BrokerConsumerPort for ScriptedConsumer {
        async fn poll(&self) -> Result<BrokerMessage, ReadError> {
            let next = self.script.lock().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    fn message(key: &str, value: &str, offset: i64) -> Result<BrokerMessage, ReadError> {
        Ok(BrokerMessage {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            partition: 0,
            offset,
        })
    }

    fn transport_error() -> Result<BrokerMessage, ReadError> {
        Err(ReadError::Transport {
            message: "broker down".to_string(),
        })
    }

    fn context(policy: DecodeFailurePolicy) -> (ReaderContext, mpsc::Receiver<FatalError>) {
        let (fatal_tx, fatal_rx) = mpsc::channel(4);
        let ctx = ReaderContext {
            queue: Arc::new(RelayQueue::new(16)),
            stats: Arc::new(PipelineStats::new()),
            decode_policy: policy,
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
                jitter_factor: 0.0,
            },
            fatal_tx,
            cancel: CancellationToken::new(),
            abort: CancellationToken::new(),
        };
        (ctx, fatal_rx)
    }

    async fn drain(queue: &RelayQueue, expected: usize) -> Vec<StockRecord> {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        for _ in 0..expected {
            let record = tokio::time::timeout(Duration::from_secs(1), queue.recv(&cancel))
                .await
                .unwrap()
                .unwrap();
            out.push(record);
        }
        out
    }

    #[test_case("fatal", DecodeFailurePolicy::Fatal)]
    #[test_case("SKIP", DecodeFailurePolicy::Skip)]
    #[test_case(" skip ", DecodeFailurePolicy::Skip)]
    fn policy_parses(input: &str, expected: DecodeFailurePolicy) {
        assert_eq!(input.parse::<DecodeFailurePolicy>().unwrap(), expected);
    }

    #[test]
    fn unknown_policy_rejected() {
        assert!("ignore".parse::<DecodeFailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn decodes_messages_into_queue() {
        let (ctx, _fatal_rx) = context(DecodeFailurePolicy::Fatal);
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![
                message("ACME", "10.500000", 0),
                message("INIT", "3.250000", 1),
            ])],
            &ctx,
        );

        let records = drain(&ctx.queue, 2).await;
        assert_eq!(records[0], StockRecord::new(0, "ACME", 10.5));
        assert_eq!(records[1], StockRecord::new(0, "INIT", 3.25));

        ctx.cancel.cancel();
        pool.join().await;
        assert_eq!(ctx.stats.snapshot().consumed, 2);
    }

    #[tokio::test]
    async fn poll_errors_are_retried() {
        let (ctx, _fatal_rx) = context(DecodeFailurePolicy::Fatal);
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![
                transport_error(),
                transport_error(),
                message("ACME", "1.000000", 7),
            ])],
            &ctx,
        );

        let records = drain(&ctx.queue, 1).await;
        assert_eq!(records[0].name, "ACME");

        ctx.cancel.cancel();
        pool.join().await;
        assert_eq!(ctx.stats.snapshot().poll_errors, 2);
    }

    #[tokio::test]
    async fn malformed_price_is_fatal_by_default() {
        let (ctx, mut fatal_rx) = context(DecodeFailurePolicy::Fatal);
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![message("ACME", "abc", 42)])],
            &ctx,
        );

        let fatal = tokio::time::timeout(Duration::from_secs(1), fatal_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match fatal {
            FatalError::Decode { worker, offset, .. } => {
                assert_eq!(worker, 0);
                assert_eq!(offset, 42);
            }
            other => panic!("unexpected fatal error: {other}"),
        }

        pool.join().await;
        assert!(ctx.queue.is_empty());
    }

    #[tokio::test]
    async fn malformed_price_skipped_when_configured() {
        let (ctx, mut fatal_rx) = context(DecodeFailurePolicy::Skip);
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![
                message("BAD", "abc", 1),
                message("GOOD", "2.000000", 2),
            ])],
            &ctx,
        );

        let records = drain(&ctx.queue, 1).await;
        assert_eq!(records[0].name, "GOOD");

        ctx.cancel.cancel();
        pool.join().await;
        assert!(fatal_rx.try_recv().is_err());
        assert_eq!(ctx.stats.snapshot().decode_failures, 1);
    }

    #[tokio::test]
    async fn stop_still_delivers_record_in_hand() {
        let (mut ctx, _fatal_rx) = context(DecodeFailurePolicy::Fatal);
        ctx.queue = Arc::new(RelayQueue::new(0));
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![message("ACME", "1.000000", 0)])],
            &ctx,
        );

        // Let the reader take the message and block on the rendezvous.
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel.cancel();

        let records = drain(&ctx.queue, 1).await;
        assert_eq!(records[0].name, "ACME");
        pool.join().await;
        assert_eq!(ctx.stats.snapshot().consumed, 1);
    }

    #[tokio::test]
    async fn abort_abandons_blocked_send() {
        let (mut ctx, _fatal_rx) = context(DecodeFailurePolicy::Fatal);
        ctx.queue = Arc::new(RelayQueue::new(0));
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![message("ACME", "1.000000", 0)])],
            &ctx,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel.cancel();
        ctx.abort.cancel();
        tokio::time::timeout(Duration::from_secs(1), pool.join())
            .await
            .unwrap();
        assert_eq!(ctx.stats.snapshot().consumed, 0);
    }

    #[tokio::test]
    async fn closed_queue_stops_reader() {
        let (ctx, _fatal_rx) = context(DecodeFailurePolicy::Fatal);
        ctx.queue.close();
        let mut pool = spawn_reader_pool(
            vec![ScriptedConsumer::boxed(vec![message("ACME", "1.000000", 0)])],
            &ctx,
        );
        tokio::time::timeout(Duration::from_secs(1), pool.join())
            .await
            .unwrap();
    }
}
