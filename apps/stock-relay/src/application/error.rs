//! Process-Fatal Errors
//!
//! Conditions that end the process. Everything else is recovered where it
//! happens: validation errors go back to the caller, publish/read/storage
//! failures cost one record or one poll.

use crate::domain::stock::DecodeError;

/// An unrecoverable condition observed by the lifecycle coordinator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FatalError {
    /// Missing or invalid configuration at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Broker handles could not be built or the broker is unreachable.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A consumed message violates the wire contract.
    #[error(
        "reader {worker} received malformed message (partition {partition}, offset {offset}): {source}"
    )]
    Decode {
        /// Reader worker index.
        worker: usize,
        /// Partition of the offending message.
        partition: i32,
        /// Offset of the offending message.
        offset: i64,
        /// Decoder error.
        source: DecodeError,
    },

    /// The HTTP server could not start or failed while running.
    #[error("http server error: {0}")]
    Server(String),
}

impl FatalError {
    /// Process exit code for this error kind.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Server(_) => 1,
            Self::Config(_) => 2,
            Self::BrokerUnavailable(_) => 3,
            Self::Decode { .. } => 4,
        }
    }
}
