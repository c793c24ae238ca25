//! Stock Price Records
//!
//! The single entity flowing through the pipeline: an identified stock
//! name with its latest price. Records are moved by value from ingress
//! to their terminal action and never shared mutably.

mod codec;

pub use codec::{DecodeError, WireMessage, decode_message, encode_price, parse_price};

use serde::{Deserialize, Serialize};

// =============================================================================
// Record
// =============================================================================

/// A stock price update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    /// Caller-assigned identifier. Zero means "not set".
    #[serde(default)]
    pub id: i64,
    /// Ticker name, also used as the broker partition key.
    #[serde(default)]
    pub name: String,
    /// Latest price.
    #[serde(default)]
    pub price: f64,
}

impl StockRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
        }
    }

    /// Validate this record, see [`validate`].
    ///
    /// # Errors
    ///
    /// Returns the first rule the record violates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(self)
    }

    /// Encode into the broker wire format (key = name, value = price text).
    #[must_use]
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            key: self.name.as_bytes().to_vec(),
            value: encode_price(self.price).into_bytes(),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Reasons a record is rejected at the ingest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The name is empty.
    #[error("Name cannot be empty")]
    EmptyName,
    /// The identifier is zero.
    #[error("ID cannot be empty")]
    EmptyIdentifier,
    /// The price is negative, NaN or infinite.
    #[error("Price must be a non-negative number")]
    InvalidPrice,
}

impl ValidationError {
    /// Short label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::EmptyIdentifier => "empty_identifier",
            Self::InvalidPrice => "invalid_price",
        }
    }
}

/// Validate a record. Rules apply in order and the first failure wins:
/// name, then identifier, then price.
///
/// # Errors
///
/// Returns [`ValidationError`] naming the violated rule.
pub fn validate(record: &StockRecord) -> Result<(), ValidationError> {
    if record.name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if record.id == 0 {
        return Err(ValidationError::EmptyIdentifier);
    }
    // NaN fails every comparison, so check it explicitly.
    if record.price.is_nan() || record.price.is_infinite() || record.price < 0.0 {
        return Err(ValidationError::InvalidPrice);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
