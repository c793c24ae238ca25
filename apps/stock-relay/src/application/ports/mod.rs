//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BrokerProducerPort` / `BrokerConsumerPort`: Topic handles on the message broker
//! - `BrokerClientPort`: Factory for broker handles
//! - `RecordSinkPort`: Persistence for consumed records
//! - `AlertPort`: Fatal-error notifications
//!
//! ## Driver Ports (Inbound)
//!
//! - `IngestService::submit` (see `services`): Entry point for validated records

mod alert_port;
mod broker_port;
mod sink_port;

pub use alert_port::{AlertError, AlertPort, NoOpAlerter, notify_or_log};
pub use broker_port::{
    BrokerClientPort, BrokerConsumerPort, BrokerError, BrokerMessage, BrokerProducerPort,
    PublishError, ReadError,
};
pub use sink_port::{LoggingSink, RecordSinkPort, StorageError};
