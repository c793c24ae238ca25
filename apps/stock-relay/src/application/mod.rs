//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay services and the port interfaces that
//! define how the domain interacts with the broker, the record sink and
//! the alert channel.

/// Process-fatal error taxonomy.
pub mod error;

/// Port interfaces for external systems (broker, sink, alerts).
pub mod ports;

/// Relay queue, worker pools, ingest and pipeline lifecycle.
pub mod services;
