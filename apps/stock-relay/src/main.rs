//! Stock Relay Binary
//!
//! Starts the relay in ingest or aggregate mode.
//!
//! # Usage
//!
//! ```bash
//! STOCK_RELAY_MODE=ingest cargo run --bin stock-relay
//! STOCK_RELAY_MODE=aggregate cargo run --bin stock-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KAFKA_HOST`, `KAFKA_PORT`, `KAFKA_TOPIC`: Broker address and topic
//!
//! ## Optional
//! - `STOCK_RELAY_MODE`: ingest | aggregate (default: ingest)
//! - `STOCK_RELAY_BROKER`: kafka | memory (default: kafka)
//! - `STOCK_RELAY_HTTP_PORT`: HTTP port (default: 8080)
//! - `STOCK_RELAY_SERVICE_NAME`: Name in alert titles (default: stock-relay)
//! - `STOCK_RELAY_{WRITER,READER,SINK}_WORKERS`: Pool sizes (default: 5)
//! - `STOCK_RELAY_QUEUE_CAPACITY`: Relay queue capacity (default: 0 ingest, 1 aggregate)
//! - `STOCK_RELAY_DECODE_FAILURE`: fatal | skip (default: fatal)
//! - `STOCK_RELAY_SHUTDOWN_TIMEOUT_SECS`: Drain timeout (default: 30)
//! - `KAFKA_GROUP_ID`: Consumer group (default: stock-aggregator)
//! - `KAFKA_MESSAGE_TIMEOUT_MS`: Publish timeout (default: 5000)
//! - `SLACK_WEBHOOK_URL`: Fatal-error alerts
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Exit Codes
//!
//! `0` clean shutdown, `1` HTTP server failure, `2` configuration error,
//! `3` broker unavailable, `4` malformed broker message.

use std::process::ExitCode;
use std::sync::Arc;

use stock_relay::application::ports::BrokerError;
use stock_relay::infrastructure::alerting::build_alerter;
use stock_relay::infrastructure::broker;
use stock_relay::infrastructure::config::AlertSettings;
use stock_relay::infrastructure::telemetry;
use stock_relay::{
    AlertPort, FatalError, HttpServer, HttpState, LoggingSink, Pipeline, PipelineStats,
    RelayConfig, init_metrics, notify_or_log,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    let _telemetry_guard = match telemetry::init() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Telemetry unavailable: {e}");
            None
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting stock relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Alert with whatever the environment provides.
            let service_name = std::env::var("STOCK_RELAY_SERVICE_NAME")
                .unwrap_or_else(|_| "stock-relay".to_string());
            let settings = AlertSettings::new(
                std::env::var("SLACK_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            );
            let alerter = build_alerter(&settings, &service_name);
            let fatal = FatalError::Config(e.to_string());
            notify_or_log(alerter.as_ref(), &fatal).await;
            return exit_code(&fatal);
        }
    };
    log_config(&config);

    let alerter = build_alerter(&config.alert, &config.service_name);
    match run(config, alerter.as_ref()).await {
        Ok(()) => {
            tracing::info!("Stock relay stopped");
            ExitCode::SUCCESS
        }
        Err(fatal) => exit_code(&fatal),
    }
}

/// Run the pipeline and HTTP server until a signal or a fatal error.
///
/// Every fatal error has been alerted by the time this returns.
async fn run(config: RelayConfig, alerter: &dyn AlertPort) -> Result<(), FatalError> {
    let pipeline = match start_pipeline(&config).await {
        Ok(pipeline) => pipeline,
        Err(fatal) => {
            notify_or_log(alerter, &fatal).await;
            return Err(fatal);
        }
    };

    let http_cancel = CancellationToken::new();
    let http_state = Arc::new(HttpState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        pipeline.monitor(),
        pipeline.ingest_service(),
    ));
    let http_server = HttpServer::new(config.server.http_port, http_state, http_cancel.clone());
    let fatal_tx = pipeline.fatal_sender();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
            let _ = fatal_tx.send(FatalError::Server(e.to_string())).await;
        }
    });

    tracing::info!(mode = %pipeline.mode(), "Stock relay ready");

    // Keep serving health and 503s while queued work drains.
    let result = pipeline.run_until(await_shutdown_signal(), alerter).await;
    http_cancel.cancel();
    if let Err(e) = http_task.await {
        tracing::error!(error = %e, "HTTP server task failed");
    }
    tracing::info!("Shutdown complete");

    result
}

/// Build the broker client and start the pipeline for the configured mode.
async fn start_pipeline(config: &RelayConfig) -> Result<Pipeline, FatalError> {
    let client = broker::build_client(config.broker, &config.kafka).map_err(|e| match e {
        BrokerError::Config { .. } => FatalError::Config(e.to_string()),
        BrokerError::Connection { .. } => FatalError::BrokerUnavailable(e.to_string()),
    })?;

    Pipeline::start(
        config.pipeline.clone(),
        client.as_ref(),
        Arc::new(LoggingSink),
        Arc::new(PipelineStats::new()),
    )
    .await
}

/// Log the failure and map it to an exit code.
fn exit_code(fatal: &FatalError) -> ExitCode {
    tracing::error!(
        error = %fatal,
        exit_code = fatal.exit_code(),
        "Terminating on fatal error"
    );
    ExitCode::from(fatal.exit_code())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        service = %config.service_name,
        mode = %config.pipeline.mode,
        broker = config.broker.as_str(),
        brokers = %config.kafka.bootstrap_servers(),
        topic = %config.kafka.topic,
        http_port = config.server.http_port,
        alerts = config.alert.slack_webhook_url().is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        writer_workers = config.pipeline.writer_workers,
        reader_workers = config.pipeline.reader_workers,
        sink_workers = config.pipeline.sink_workers,
        queue_capacity = config.pipeline.queue_capacity,
        decode_failure = config.pipeline.decode_failure.as_str(),
        group_id = %config.kafka.group_id,
        shutdown_timeout_secs = config.pipeline.shutdown_timeout.as_secs(),
        "Pipeline settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
