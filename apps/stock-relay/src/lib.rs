#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stock Relay - Price Ingest and Aggregation Pipeline
//!
//! A service that accepts stock prices over HTTP, relays them through a
//! message broker topic and drains them into a record sink. One binary
//! runs either half, selected by `STOCK_RELAY_MODE`.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core record type and rules
//!   - `stock`: `StockRecord`, validation, broker wire format
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the broker, the record sink and alerts
//!   - `services`: Relay queue, worker pools, ingest, pipeline lifecycle
//!   - `error`: Process-fatal errors and exit codes
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broker`: Kafka and in-memory broker adapters
//!   - `http`: Ingest, health and metrics endpoints
//!   - `alerting`: Slack webhook alerts
//!   - `config`: Environment-driven configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//! ingest:
//!   POST /api/v1/stock ──► validate ──► RelayQueue ──► writer pool ──► topic
//!
//! aggregate:
//!   topic ──► reader pool ──► decode ──► RelayQueue ──► sink pool ──► sink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core record types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::stock::{DecodeError, StockRecord, ValidationError, validate};

// Application
pub use application::error::FatalError;
pub use application::ports::{
    AlertError, AlertPort, BrokerClientPort, BrokerConsumerPort, BrokerProducerPort, LoggingSink,
    NoOpAlerter, RecordSinkPort, notify_or_log,
};
pub use application::services::{
    DecodeFailurePolicy, IngestService, Pipeline, PipelineMode, PipelineMonitor,
    PipelineSettings, PipelineStats, RelayQueue, SubmitError,
};

// Infrastructure config
pub use infrastructure::config::{BrokerKind, ConfigError, KafkaSettings, RelayConfig};

// Broker adapters
pub use infrastructure::broker::InMemoryBroker;
#[cfg(feature = "kafka")]
pub use infrastructure::broker::KafkaClient;

// HTTP server
pub use infrastructure::http::{HttpServer, HttpServerError, HttpState, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
