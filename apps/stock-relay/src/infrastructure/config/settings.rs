//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::application::services::{
    BackoffConfig, DecodeFailurePolicy, PipelineMode, PipelineSettings,
};

/// Message broker backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerKind {
    /// Apache Kafka via librdkafka.
    #[default]
    Kafka,
    /// In-process broker for local runs and tests.
    Memory,
}

impl BrokerKind {
    /// Parse broker kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kafka" => Some(Self::Kafka),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Get the broker name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kafka => "kafka",
            Self::Memory => "memory",
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Topic carrying stock records.
    pub topic: String,
    /// Consumer group shared by all readers.
    pub group_id: String,
    /// Delivery timeout for one publish.
    pub message_timeout: Duration,
}

impl KafkaSettings {
    /// `host:port` bootstrap address.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Port for ingest, health and metrics routes.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Alert delivery settings.
#[derive(Clone, Default)]
pub struct AlertSettings {
    slack_webhook_url: Option<String>,
}

impl AlertSettings {
    /// Create alert settings.
    #[must_use]
    pub const fn new(slack_webhook_url: Option<String>) -> Self {
        Self { slack_webhook_url }
    }

    /// Slack incoming-webhook URL, if configured.
    #[must_use]
    pub fn slack_webhook_url(&self) -> Option<&str> {
        self.slack_webhook_url.as_deref()
    }
}

impl std::fmt::Debug for AlertSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertSettings")
            .field(
                "slack_webhook_url",
                &self.slack_webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Name used in alert titles.
    pub service_name: String,
    /// Broker backend.
    pub broker: BrokerKind,
    /// Broker connection settings.
    pub kafka: KafkaSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Pool sizes, queue capacity and shutdown timing.
    pub pipeline: PipelineSettings,
    /// Alert delivery.
    pub alert: AlertSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty, or if a value cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(&lookup, "KAFKA_HOST")?;
        let port_text = required(&lookup, "KAFKA_PORT")?;
        let topic = required(&lookup, "KAFKA_TOPIC")?;
        let port = port_text
            .trim()
            .parse::<u16>()
            .map_err(|e| invalid("KAFKA_PORT", e.to_string()))?;
        if port == 0 {
            return Err(invalid("KAFKA_PORT", "port must be non-zero"));
        }

        let mode = match lookup("STOCK_RELAY_MODE") {
            Some(value) => value
                .parse::<PipelineMode>()
                .map_err(|message| invalid("STOCK_RELAY_MODE", message))?,
            None => PipelineMode::Ingest,
        };

        let broker = match lookup("STOCK_RELAY_BROKER") {
            Some(value) => BrokerKind::from_str_case_insensitive(&value)
                .ok_or_else(|| invalid("STOCK_RELAY_BROKER", format!("unknown broker '{value}'")))?,
            None => BrokerKind::default(),
        };

        let decode_failure = match lookup("STOCK_RELAY_DECODE_FAILURE") {
            Some(value) => value
                .parse::<DecodeFailurePolicy>()
                .map_err(|message| invalid("STOCK_RELAY_DECODE_FAILURE", message))?,
            None => DecodeFailurePolicy::default(),
        };

        let defaults = PipelineSettings::for_mode(mode);
        let backoff_defaults = BackoffConfig::default();
        let pipeline = PipelineSettings {
            mode,
            writer_workers: pool_size(&lookup, "STOCK_RELAY_WRITER_WORKERS", defaults.writer_workers)?,
            reader_workers: pool_size(&lookup, "STOCK_RELAY_READER_WORKERS", defaults.reader_workers)?,
            sink_workers: pool_size(&lookup, "STOCK_RELAY_SINK_WORKERS", defaults.sink_workers)?,
            queue_capacity: parse_env_usize(
                &lookup,
                "STOCK_RELAY_QUEUE_CAPACITY",
                defaults.queue_capacity,
            ),
            decode_failure,
            backoff: BackoffConfig {
                initial_delay: parse_env_duration_millis(
                    &lookup,
                    "STOCK_RELAY_POLL_BACKOFF_INITIAL_MS",
                    backoff_defaults.initial_delay,
                ),
                max_delay: parse_env_duration_millis(
                    &lookup,
                    "STOCK_RELAY_POLL_BACKOFF_MAX_MS",
                    backoff_defaults.max_delay,
                ),
                ..backoff_defaults
            },
            shutdown_timeout: parse_env_duration_secs(
                &lookup,
                "STOCK_RELAY_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout,
            ),
        };

        let kafka = KafkaSettings {
            host,
            port,
            topic,
            group_id: lookup("KAFKA_GROUP_ID")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "stock-aggregator".to_string()),
            message_timeout: parse_env_duration_millis(
                &lookup,
                "KAFKA_MESSAGE_TIMEOUT_MS",
                Duration::from_millis(5000),
            ),
        };

        let server = ServerSettings {
            http_port: parse_env_u16(
                &lookup,
                "STOCK_RELAY_HTTP_PORT",
                ServerSettings::default().http_port,
            ),
        };

        Ok(Self {
            service_name: lookup("STOCK_RELAY_SERVICE_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "stock-relay".to_string()),
            broker,
            kafka,
            server,
            pipeline,
            alert: AlertSettings::new(lookup("SLACK_WEBHOOK_URL").filter(|v| !v.is_empty())),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn pool_size<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_env_usize(lookup, key, default) {
        0 => Err(invalid(key, "pool size must be at least 1")),
        size => Ok(size),
    }
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
