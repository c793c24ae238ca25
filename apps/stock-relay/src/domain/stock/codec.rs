//! Broker Wire Format
//!
//! Records travel through the broker as a key/value pair:
//!
//! - key: the record name as raw bytes
//! - value: the price as fixed-point decimal text with six fractional
//!   digits (`10.5` becomes `"10.500000"`)
//!
//! The identifier is not part of the wire format. Existing producers and
//! consumers depend on this text encoding, so it must stay bit-for-bit
//! stable.

use std::num::ParseFloatError;

use super::StockRecord;

/// Number of fractional digits written for prices.
const PRICE_PRECISION: usize = 6;

/// A key/value pair as published to or read from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Partition key (record name).
    pub key: Vec<u8>,
    /// Payload (price text).
    pub value: Vec<u8>,
}

/// A broker message whose payload does not follow the wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The value is not valid UTF-8.
    #[error("price payload is not valid UTF-8")]
    NotUtf8,
    /// The value is not a decimal number.
    #[error("invalid price payload {value:?}: {source}")]
    InvalidPrice {
        /// The offending payload text.
        value: String,
        /// Parser error.
        source: ParseFloatError,
    },
}

/// Format a price as wire text.
#[must_use]
pub fn encode_price(price: f64) -> String {
    format!("{price:.prec$}", prec = PRICE_PRECISION)
}

/// Parse wire text back into a price.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidPrice`] if the text is not a float.
pub fn parse_price(text: &str) -> Result<f64, DecodeError> {
    text.parse::<f64>()
        .map_err(|source| DecodeError::InvalidPrice {
            value: text.to_string(),
            source,
        })
}

/// Decode a consumed broker message into a record.
///
/// The key becomes the name (invalid UTF-8 is replaced, never rejected);
/// the value must parse as a price. The identifier is left at zero.
///
/// # Errors
///
/// Returns [`DecodeError`] if the value is not UTF-8 or not a number.
pub fn decode_message(key: &[u8], value: &[u8]) -> Result<StockRecord, DecodeError> {
    let text = std::str::from_utf8(value).map_err(|_| DecodeError::NotUtf8)?;
    let price = parse_price(text)?;
    Ok(StockRecord {
        id: 0,
        name: String::from_utf8_lossy(key).into_owned(),
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_six_fraction_digits() {
        assert_eq!(encode_price(10.5), "10.500000");
        assert_eq!(encode_price(123.45), "123.450000");
        assert_eq!(encode_price(0.0), "0.000000");
        assert_eq!(encode_price(1.000_000_4), "1.000000");
    }

    #[test]
    fn parses_wire_text() {
        assert!((parse_price("123.450000").unwrap() - 123.45).abs() < f64::EPSILON);
        assert!((parse_price("10.500000").unwrap() - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_numeric_price() {
        let err = parse_price("ten dollars").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPrice { ref value, .. } if value == "ten dollars"));
    }

    #[test]
    fn decode_builds_record_from_key_and_value() {
        let record = decode_message(b"ACME", b"10.500000").unwrap();
        assert_eq!(record, StockRecord::new(0, "ACME", 10.5));
    }

    #[test]
    fn decode_rejects_binary_value() {
        assert_eq!(
            decode_message(b"ACME", &[0xff, 0xfe]),
            Err(DecodeError::NotUtf8)
        );
    }

    #[test]
    fn decode_tolerates_binary_key() {
        let record = decode_message(&[b'A', 0xff], b"1.000000").unwrap();
        assert!(record.name.starts_with('A'));
    }

    proptest! {
        #[test]
        fn price_text_round_trip(price in 0.0f64..1.0e12) {
            let decoded = parse_price(&encode_price(price)).unwrap();
            let tolerance = 5.0e-7 + price * f64::EPSILON;
            prop_assert!((decoded - price).abs() <= tolerance, "{price} -> {decoded}");
        }
    }
}
