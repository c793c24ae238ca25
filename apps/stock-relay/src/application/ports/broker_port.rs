//! Broker Ports (Driven Ports)
//!
//! Interfaces over a partitioned append-log broker. A producer handle
//! appends key/value pairs to the configured topic; a consumer handle
//! reads the next message for its consumer group.

use std::sync::Arc;

use async_trait::async_trait;

/// A message read from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Partition key.
    pub key: Vec<u8>,
    /// Payload.
    pub value: Vec<u8>,
    /// Partition the message was read from.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// Failure to publish a single message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Transport or broker-side failure.
    #[error("publish failed: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The broker did not acknowledge in time.
    #[error("publish timed out")]
    Timeout,
}

/// Failure to read the next message. Always treated as transient.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReadError {
    /// Transport or broker-side failure.
    #[error("read failed: {message}")]
    Transport {
        /// Error details.
        message: String,
    },
}

/// Failure to construct a broker handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Broker address or topic is missing.
    #[error("broker configuration error: {message}")]
    Config {
        /// Error details.
        message: String,
    },

    /// The client could not be created or the broker is unreachable.
    #[error("broker connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },
}

/// Port for publishing to the configured topic.
///
/// Implementations must be safe for concurrent `publish` calls: a single
/// handle is shared by every writer worker.
#[async_trait]
pub trait BrokerProducerPort: Send + Sync {
    /// Publish one message, suspending until acknowledged or failed.
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError>;

    /// Verify the broker is reachable and the topic is known.
    async fn check_connection(&self) -> Result<(), PublishError>;
}

/// Port for reading from the configured topic.
///
/// `poll` never signals end-of-stream; the topic is an infinite stream.
#[async_trait]
pub trait BrokerConsumerPort: Send + Sync {
    /// Read the next message, suspending until one arrives or an error occurs.
    async fn poll(&self) -> Result<BrokerMessage, ReadError>;
}

/// Factory for broker handles bound to one topic.
pub trait BrokerClientPort: Send + Sync {
    /// Create a producer handle.
    fn producer(&self) -> Result<Arc<dyn BrokerProducerPort>, BrokerError>;

    /// Create a consumer handle joined to the configured consumer group.
    fn consumer(&self) -> Result<Box<dyn BrokerConsumerPort>, BrokerError>;
}
