//! Kafka Broker Adapter
//!
//! `rdkafka` implementations of the broker ports. One `FutureProducer` is
//! shared by every writer; each reader gets its own `StreamConsumer` in
//! the configured consumer group.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::application::ports::{
    BrokerClientPort, BrokerConsumerPort, BrokerError, BrokerMessage, BrokerProducerPort,
    PublishError, ReadError,
};
use crate::infrastructure::config::KafkaSettings;

/// Timeout for the startup metadata request.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Client
// =============================================================================

/// Factory for Kafka producer and consumer handles.
#[derive(Debug, Clone)]
pub struct KafkaClient {
    settings: KafkaSettings,
}

impl KafkaClient {
    /// Create a client for the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] if host, port or topic is unset.
    pub fn new(settings: KafkaSettings) -> Result<Self, BrokerError> {
        if settings.host.is_empty() || settings.topic.is_empty() || settings.port == 0 {
            return Err(BrokerError::Config {
                message: "Kafka host, port or topic cannot be empty".to_string(),
            });
        }
        Ok(Self { settings })
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.settings.bootstrap_servers())
            .set(
                "message.timeout.ms",
                self.settings.message_timeout.as_millis().to_string(),
            );
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.settings.bootstrap_servers())
            .set("group.id", &self.settings.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000");
        config
    }
}

impl BrokerClientPort for KafkaClient {
    fn producer(&self) -> Result<Arc<dyn BrokerProducerPort>, BrokerError> {
        let producer: FutureProducer =
            self.producer_config()
                .create()
                .map_err(|e| BrokerError::Connection {
                    message: format!("failed to create producer: {e}"),
                })?;

        tracing::info!(
            brokers = %self.settings.bootstrap_servers(),
            topic = %self.settings.topic,
            "Kafka producer created"
        );

        Ok(Arc::new(KafkaProducer {
            producer,
            topic: self.settings.topic.clone(),
            timeout: self.settings.message_timeout,
        }))
    }

    fn consumer(&self) -> Result<Box<dyn BrokerConsumerPort>, BrokerError> {
        let consumer: StreamConsumer =
            self.consumer_config()
                .create()
                .map_err(|e| BrokerError::Connection {
                    message: format!("failed to create consumer: {e}"),
                })?;

        consumer
            .subscribe(&[self.settings.topic.as_str()])
            .map_err(|e| BrokerError::Connection {
                message: format!("failed to subscribe: {e}"),
            })?;

        tracing::info!(
            brokers = %self.settings.bootstrap_servers(),
            topic = %self.settings.topic,
            group = %self.settings.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Box::new(KafkaConsumer { consumer }))
    }
}

// =============================================================================
// Producer
// =============================================================================

struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

#[async_trait]
impl BrokerProducerPort for KafkaProducer {
    async fn publish(&self, key: &[u8], value: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(value);
        self.producer
            .send(record, self.timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| publish_error(&e))
    }

    async fn check_connection(&self) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(topic.as_str()), METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| PublishError::Transport {
            message: format!("metadata task failed: {e}"),
        })?
        .map_err(|e| publish_error(&e))
    }
}

fn publish_error(error: &KafkaError) -> PublishError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::OperationTimedOut) => {
            PublishError::Timeout
        }
        _ => PublishError::Transport {
            message: error.to_string(),
        },
    }
}

// =============================================================================
// Consumer
// =============================================================================

struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl BrokerConsumerPort for KafkaConsumer {
    async fn poll(&self) -> Result<BrokerMessage, ReadError> {
        let message = self.consumer.recv().await.map_err(|e| ReadError::Transport {
            message: e.to_string(),
        })?;

        Ok(BrokerMessage {
            key: message.key().unwrap_or_default().to_vec(),
            value: message.payload().unwrap_or_default().to_vec(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }
}
