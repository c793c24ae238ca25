//! Slack Alerting
//!
//! Posts fatal errors to a Slack incoming webhook as a block-kit message:
//! a title section naming the service, then a section with the error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::application::error::FatalError;
use crate::application::ports::{AlertError, AlertPort, NoOpAlerter};
use crate::infrastructure::config::AlertSettings;

/// Alert delivery timeout. The process is about to exit, so keep it short.
const ALERT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload {
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: SlackText,
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    verbatim: bool,
}

impl SlackPayload {
    fn new(service_name: &str, message: String) -> Self {
        Self {
            blocks: vec![
                SlackBlock::markdown(format!("[{service_name}]")),
                SlackBlock::markdown(message),
            ],
        }
    }
}

impl SlackBlock {
    const fn markdown(text: String) -> Self {
        Self {
            kind: "section",
            text: SlackText {
                kind: "mrkdwn",
                text,
                verbatim: false,
            },
        }
    }
}

// =============================================================================
// Alerter
// =============================================================================

/// Alerter posting to a Slack incoming webhook.
pub struct SlackAlerter {
    client: reqwest::Client,
    webhook_url: String,
    service_name: String,
}

impl std::fmt::Debug for SlackAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackAlerter")
            .field("webhook_url", &"[REDACTED]")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

impl SlackAlerter {
    /// Create an alerter for the given webhook.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::DeliveryFailed`] if the HTTP client cannot be
    /// built.
    pub fn new(webhook_url: String, service_name: String) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(ALERT_TIMEOUT)
            .build()
            .map_err(|e| AlertError::DeliveryFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            webhook_url,
            service_name,
        })
    }
}

#[async_trait]
impl AlertPort for SlackAlerter {
    async fn notify_fatal(&self, error: &FatalError) -> Result<(), AlertError> {
        let payload = SlackPayload::new(&self.service_name, error.to_string());

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError::DeliveryFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::DeliveryFailed {
                message: format!("webhook returned {status}: {body}"),
            });
        }

        tracing::info!(service = %self.service_name, "Fatal alert delivered");
        Ok(())
    }
}

/// Build the alerter selected by configuration.
///
/// Falls back to [`NoOpAlerter`] when no webhook is configured or the
/// HTTP client cannot be built.
#[must_use]
pub fn build_alerter(settings: &AlertSettings, service_name: &str) -> Arc<dyn AlertPort> {
    let Some(url) = settings.slack_webhook_url() else {
        return Arc::new(NoOpAlerter);
    };

    match SlackAlerter::new(url.to_string(), service_name.to_string()) {
        Ok(alerter) => Arc::new(alerter),
        Err(e) => {
            tracing::warn!(error = %e, "Slack alerter unavailable, alerts will only be logged");
            Arc::new(NoOpAlerter)
        }
    }
}
