//! Domain Layer - Stock price records and validation.
//!
//! This layer contains the core domain types for the relay pipeline
//! with no runtime dependencies. All types here are pure Rust with
//! serialization support.

/// Stock price records, validation rules and the broker wire format.
pub mod stock;
