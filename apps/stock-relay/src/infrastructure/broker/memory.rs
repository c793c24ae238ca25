//! In-Memory Broker
//!
//! A single-topic, single-partition broker living inside the process.
//! Every consumer handle reads from the same unbounded channel, so each
//! message is delivered to exactly one consumer (one consumer group).
//!
//! Failures can be injected for tests: failed publishes, failed polls and
//! an unreachable broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::application::ports::{
    BrokerClientPort, BrokerConsumerPort, BrokerError, BrokerMessage, BrokerProducerPort,
    PublishError, ReadError,
};

/// In-process broker; clones share the same topic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: flume::Sender<BrokerMessage>,
    rx: flume::Receiver<BrokerMessage>,
    next_offset: AtomicI64,
    publish_failures: AtomicUsize,
    poll_failures: AtomicUsize,
    unreachable: AtomicBool,
}

impl Default for Inner {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            next_offset: AtomicI64::new(0),
            publish_failures: AtomicUsize::new(0),
            poll_failures: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
        }
    }
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.inner.publish_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` polls fail.
    pub fn fail_next_polls(&self, count: usize) {
        self.inner.poll_failures.store(count, Ordering::SeqCst);
    }

    /// Mark the broker unreachable for connection checks.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Append a raw message, bypassing the producer port.
    pub fn append(&self, key: &[u8], value: &[u8]) {
        self.inner.append(key, value);
    }

    /// Messages published and not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.rx.len()
    }

    /// Total messages ever appended.
    #[must_use]
    pub fn appended(&self) -> i64 {
        self.inner.next_offset.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn append(&self, key: &[u8], value: &[u8]) {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.tx.send(BrokerMessage {
            key: key.to_vec(),
            value: value.to_vec(),
            partition: 0,
            offset,
        });
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl BrokerClientPort for InMemoryBroker {
    fn producer(&self) -> Result<Arc<dyn BrokerProducerPort>, BrokerError> {
        Ok(Arc::new(MemoryProducer {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn consumer(&self) -> Result<Box<dyn BrokerConsumerPort>, BrokerError> {
        Ok(Box::new(MemoryConsumer {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryProducer {
    inner: Arc<Inner>,
}

#[async_trait]
impl BrokerProducerPort for MemoryProducer {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError> {
        if Inner::take_failure(&self.inner.publish_failures) {
            return Err(PublishError::Transport {
                message: "injected publish failure".to_string(),
            });
        }
        self.inner.append(key, value);
        Ok(())
    }

    async fn check_connection(&self) -> Result<(), PublishError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(PublishError::Transport {
                message: "broker unreachable".to_string(),
            });
        }
        Ok(())
    }
}

struct MemoryConsumer {
    inner: Arc<Inner>,
}

#[async_trait]
impl BrokerConsumerPort for MemoryConsumer {
    async fn poll(&self) -> Result<BrokerMessage, ReadError> {
        if Inner::take_failure(&self.inner.poll_failures) {
            return Err(ReadError::Transport {
                message: "injected poll failure".to_string(),
            });
        }
        self.inner
            .rx
            .recv_async()
            .await
            .map_err(|e| ReadError::Transport {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_messages_are_consumed_in_order() {
        let broker = InMemoryBroker::new();
        let producer = broker.producer().unwrap();
        let consumer = broker.consumer().unwrap();

        producer.publish(b"A", b"1.000000").await.unwrap();
        producer.publish(b"B", b"2.000000").await.unwrap();
        assert_eq!(broker.pending(), 2);

        let first = consumer.poll().await.unwrap();
        let second = consumer.poll().await.unwrap();
        assert_eq!((first.key.as_slice(), first.offset), (b"A".as_slice(), 0));
        assert_eq!((second.key.as_slice(), second.offset), (b"B".as_slice(), 1));
    }

    #[tokio::test]
    async fn injected_publish_failures_are_consumed() {
        let broker = InMemoryBroker::new();
        let producer = broker.producer().unwrap();
        broker.fail_next_publishes(1);

        assert!(producer.publish(b"A", b"1").await.is_err());
        assert!(producer.publish(b"A", b"1").await.is_ok());
        assert_eq!(broker.appended(), 1);
    }

    #[tokio::test]
    async fn injected_poll_failures_are_consumed() {
        let broker = InMemoryBroker::new();
        let consumer = broker.consumer().unwrap();
        broker.append(b"A", b"1");
        broker.fail_next_polls(1);

        assert!(consumer.poll().await.is_err());
        assert!(consumer.poll().await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_broker_fails_connection_check() {
        let broker = InMemoryBroker::new();
        let producer = broker.producer().unwrap();
        assert!(producer.check_connection().await.is_ok());

        broker.set_unreachable(true);
        assert!(producer.check_connection().await.is_err());
    }

    #[tokio::test]
    async fn consumers_share_one_group() {
        let broker = InMemoryBroker::new();
        let a = broker.consumer().unwrap();
        let b = broker.consumer().unwrap();
        broker.append(b"X", b"1");
        broker.append(b"Y", b"2");

        let mut keys = vec![a.poll().await.unwrap().key, b.poll().await.unwrap().key];
        keys.sort();
        assert_eq!(keys, vec![b"X".to_vec(), b"Y".to_vec()]);
        assert_eq!(broker.pending(), 0);
    }
}
