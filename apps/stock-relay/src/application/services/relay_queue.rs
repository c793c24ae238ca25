//! Bounded Relay Queue
//!
//! A fixed-capacity FIFO carrying records between producers (HTTP
//! handlers, broker readers) and pool workers. Every record is received
//! by exactly one worker.
//!
//! # Semantics
//!
//! - Capacity `0` is a rendezvous: `send` completes only once a worker
//!   has taken the record.
//! - `close` is idempotent. Sends after close fail with
//!   [`QueueError::Closed`]; receivers keep draining buffered records and
//!   see `Closed` only once the queue is empty.
//! - Both `send` and `recv` race the caller's cancellation token.

use tokio_util::sync::CancellationToken;

use crate::domain::stock::StockRecord;

/// Queue operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is closed (and, for receivers, drained).
    #[error("relay queue is closed")]
    Closed,
    /// The caller's cancellation token fired while suspended.
    #[error("relay queue operation cancelled")]
    Cancelled,
}

/// Shared bounded MPMC queue of records.
#[derive(Debug)]
pub struct RelayQueue {
    tx: parking_lot::RwLock<Option<flume::Sender<StockRecord>>>,
    rx: flume::Receiver<StockRecord>,
    capacity: usize,
}

impl RelayQueue {
    /// Create an open queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx: parking_lot::RwLock::new(Some(tx)),
            rx,
            capacity,
        }
    }

    /// Enqueue a record, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue was closed and
    /// [`QueueError::Cancelled`] if `cancel` fired first. The record is
    /// dropped in both cases.
    pub async fn send(
        &self,
        record: StockRecord,
        cancel: &CancellationToken,
    ) -> Result<(), QueueError> {
        let tx = self.tx.read().clone().ok_or(QueueError::Closed)?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(QueueError::Cancelled),
            result = tx.send_async(record) => result.map_err(|_| QueueError::Closed),
        }
    }

    /// Receive the next record, suspending while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and drained,
    /// or [`QueueError::Cancelled`] if `cancel` fired first.
    pub async fn recv(&self, cancel: &CancellationToken) -> Result<StockRecord, QueueError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(QueueError::Cancelled),
            result = self.rx.recv_async() => result.map_err(|_| QueueError::Closed),
        }
    }

    /// Close the queue. Returns `true` on the first call only.
    ///
    /// Sends already suspended when `close` runs may still complete.
    pub fn close(&self) -> bool {
        let closed = self.tx.write().take().is_some();
        if closed {
            tracing::info!(buffered = self.len(), "Relay queue closed");
        }
        closed
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no records are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn record(id: i64) -> StockRecord {
        StockRecord::new(id, format!("S{id}"), 1.0)
    }

    #[tokio::test]
    async fn fifo_within_capacity() {
        let queue = RelayQueue::new(3);
        let cancel = CancellationToken::new();
        for id in 1..=3 {
            queue.send(record(id), &cancel).await.unwrap();
        }
        assert_eq!(queue.len(), 3);
        for id in 1..=3 {
            assert_eq!(queue.recv(&cancel).await.unwrap().id, id);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn rendezvous_send_waits_for_receiver() {
        let queue = Arc::new(RelayQueue::new(0));
        let cancel = CancellationToken::new();

        let pending = timeout(Duration::from_millis(50), queue.send(record(1), &cancel)).await;
        assert!(pending.is_err(), "send must suspend with no receiver");

        let receiver = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.recv(&cancel).await })
        };
        queue.send(record(2), &cancel).await.unwrap();
        assert_eq!(receiver.await.unwrap().unwrap().id, 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let queue = RelayQueue::new(1);
        assert!(!queue.is_closed());
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let queue = RelayQueue::new(1);
        let cancel = CancellationToken::new();
        queue.close();
        assert_eq!(
            queue.send(record(1), &cancel).await,
            Err(QueueError::Closed)
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn receivers_drain_before_closed() {
        let queue = RelayQueue::new(2);
        let cancel = CancellationToken::new();
        queue.send(record(1), &cancel).await.unwrap();
        queue.send(record(2), &cancel).await.unwrap();
        queue.close();

        assert_eq!(queue.recv(&cancel).await.unwrap().id, 1);
        assert_eq!(queue.recv(&cancel).await.unwrap().id, 2);
        assert_eq!(queue.recv(&cancel).await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn close_wakes_waiting_receivers() {
        let queue = Arc::new(RelayQueue::new(1));
        let cancel = CancellationToken::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.recv(&cancel).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let closers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.close() })
            })
            .collect();
        let mut closed_here = 0;
        for closer in closers {
            if closer.await.unwrap() {
                closed_here += 1;
            }
        }
        assert_eq!(closed_here, 1);
        assert!(!queue.close());

        for waiter in waiters {
            let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
            assert_eq!(result, Err(QueueError::Closed));
        }
    }

    #[tokio::test]
    async fn cancellation_unblocks_full_send() {
        let queue = RelayQueue::new(1);
        let cancel = CancellationToken::new();
        queue.send(record(1), &cancel).await.unwrap();

        let child = cancel.child_token();
        let canceller = child.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert_eq!(
            queue.send(record(2), &child).await,
            Err(QueueError::Cancelled)
        );
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_unblocks_empty_recv() {
        let queue = RelayQueue::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.recv(&cancel).await, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn each_record_received_once() {
        let queue = Arc::new(RelayQueue::new(4));
        let cancel = CancellationToken::new();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Ok(record) = queue.recv(&cancel).await {
                        seen.push(record.id);
                    }
                    seen
                })
            })
            .collect();

        for id in 1..=200 {
            queue.send(record(id), &cancel).await.unwrap();
        }
        queue.close();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=200).collect::<Vec<_>>());
    }
}
