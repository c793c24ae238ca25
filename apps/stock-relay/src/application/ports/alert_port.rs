//! Alert Port (Driven Port)
//!
//! Interface for notifying operators about fatal errors before the
//! process terminates.

use async_trait::async_trait;

use crate::application::error::FatalError;

/// Failure to deliver an alert.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AlertError {
    /// The alert could not be delivered.
    #[error("alert delivery failed: {message}")]
    DeliveryFailed {
        /// Error details.
        message: String,
    },
}

/// Port for fatal-error notifications.
#[async_trait]
pub trait AlertPort: Send + Sync {
    /// Notify about a fatal error. Called at most once per process.
    async fn notify_fatal(&self, error: &FatalError) -> Result<(), AlertError>;
}

/// Alerter used when no alert sink is configured.
#[derive(Debug, Clone, Default)]
pub struct NoOpAlerter;

#[async_trait]
impl AlertPort for NoOpAlerter {
    async fn notify_fatal(&self, error: &FatalError) -> Result<(), AlertError> {
        tracing::warn!(error = %error, "Alert sink not configured, terminating without alert");
        Ok(())
    }
}

/// Deliver a fatal alert. Delivery failures are logged, never escalated.
pub async fn notify_or_log(alerter: &dyn AlertPort, error: &FatalError) {
    if let Err(e) = alerter.notify_fatal(error).await {
        tracing::error!(error = %e, fatal = %error, "Failed to deliver fatal alert");
    }
}
