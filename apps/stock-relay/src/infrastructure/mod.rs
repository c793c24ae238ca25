//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Slack alert adapter.
pub mod alerting;

/// Kafka and in-memory broker adapters.
pub mod broker;

/// Configuration loading.
pub mod config;

/// Ingest, health and metrics HTTP endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;

