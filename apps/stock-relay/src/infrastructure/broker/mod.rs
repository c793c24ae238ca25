//! Message Broker Adapters
//!
//! Implementations of the broker ports:
//!
//! - **Kafka**: `rdkafka` producer and consumer handles (feature `kafka`)
//! - **Memory**: in-process topic for local runs and tests

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

use std::sync::Arc;

#[cfg(feature = "kafka")]
pub use kafka::KafkaClient;
pub use memory::InMemoryBroker;

use crate::application::ports::{BrokerClientPort, BrokerError};
use crate::infrastructure::config::{BrokerKind, KafkaSettings};

/// Build the broker client selected by configuration.
///
/// # Errors
///
/// Returns [`BrokerError::Config`] if the settings are incomplete or the
/// selected backend was not compiled in.
pub fn build_client(
    kind: BrokerKind,
    settings: &KafkaSettings,
) -> Result<Arc<dyn BrokerClientPort>, BrokerError> {
    match kind {
        BrokerKind::Kafka => kafka_client(settings),
        BrokerKind::Memory => {
            tracing::warn!("Using in-memory broker; records do not leave this process");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka_client(settings: &KafkaSettings) -> Result<Arc<dyn BrokerClientPort>, BrokerError> {
    Ok(Arc::new(KafkaClient::new(settings.clone())?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_client(_settings: &KafkaSettings) -> Result<Arc<dyn BrokerClientPort>, BrokerError> {
    Err(BrokerError::Config {
        message: "built without Kafka support; enable the `kafka` feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings() -> KafkaSettings {
        KafkaSettings {
            host: "localhost".to_string(),
            port: 9092,
            topic: "stocks".to_string(),
            group_id: "stock-aggregator".to_string(),
            message_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn memory_backend_always_builds() {
        assert!(build_client(BrokerKind::Memory, &settings()).is_ok());
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn kafka_backend_builds_without_connecting() {
        assert!(build_client(BrokerKind::Kafka, &settings()).is_ok());
    }
}
