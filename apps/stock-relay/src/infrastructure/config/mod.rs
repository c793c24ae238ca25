//! Configuration Module
//!
//! Environment-driven configuration for the relay service.

mod settings;

pub use settings::{
    AlertSettings, BrokerKind, ConfigError, KafkaSettings, RelayConfig, ServerSettings,
};
