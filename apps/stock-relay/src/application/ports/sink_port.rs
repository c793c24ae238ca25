//! Record Sink Port (Driven Port)
//!
//! Interface for durably storing records consumed from the broker.

use async_trait::async_trait;

use crate::domain::stock::StockRecord;

/// Storage failure for a single record.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The backing store rejected or failed the write.
    #[error("storage write failed: {message}")]
    WriteFailed {
        /// Error details.
        message: String,
    },
}

/// Port for persisting consumed records.
#[async_trait]
pub trait RecordSinkPort: Send + Sync {
    /// Store one record.
    async fn store(&self, record: StockRecord) -> Result<(), StorageError>;
}

/// Sink that only logs each record.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl RecordSinkPort for LoggingSink {
    async fn store(&self, record: StockRecord) -> Result<(), StorageError> {
        tracing::info!(name = %record.name, price = record.price, "Added stock to DB");
        Ok(())
    }
}
