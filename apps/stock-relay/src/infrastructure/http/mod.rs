//! HTTP Server
//!
//! Ingest API plus health and metrics endpoints. Used by clients
//! submitting prices, container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `POST /api/v1/stock` - Submit a record (ingest mode only)
//! - `GET /api/v1/healthcheck` - Plain service check
//! - `GET /health` - JSON pipeline status
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (checks worker pools)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{
    IngestService, PipelineMonitor, PipelineStatus, SubmitError,
};
use crate::domain::stock::StockRecord;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Pipeline status.
    pub pipeline: PipelineStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every worker running.
    Healthy,
    /// Some workers gone, or shutting down.
    Degraded,
    /// A pool has no workers left.
    Unhealthy,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
#[derive(Debug)]
pub struct HttpState {
    version: String,
    started_at: Instant,
    monitor: Arc<PipelineMonitor>,
    ingest: Option<IngestService>,
}

impl HttpState {
    /// Create server state. `ingest` enables the submit route.
    #[must_use]
    pub fn new(
        version: String,
        monitor: Arc<PipelineMonitor>,
        ingest: Option<IngestService>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            monitor,
            ingest,
        }
    }
}

/// Build the router for the given state.
///
/// The submit route exists only when the state carries an ingest service.
pub fn router(state: Arc<HttpState>) -> Router {
    let ingest = state.ingest.clone();
    let app = Router::new()
        .route("/api/v1/healthcheck", get(healthcheck_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    match ingest {
        Some(ingest) => app.merge(
            Router::new()
                .route("/api/v1/stock", post(submit_handler))
                .with_state(ingest),
        ),
        None => app,
    }
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for ingest, health and metrics.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn submit_handler(
    State(ingest): State<IngestService>,
    body: Result<Json<StockRecord>, JsonRejection>,
) -> impl IntoResponse {
    let Json(record) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            );
        }
    };

    match ingest.submit(record).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "message": "Successfully added stock." })),
        ),
        Err(e @ SubmitError::Rejected(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
        Err(e @ SubmitError::Unavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn healthcheck_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "message": "OK" })))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if state.monitor.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HttpState) -> HealthResponse {
    let pipeline = state.monitor.status();
    HealthResponse {
        status: determine_health_status(&pipeline),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        pipeline,
    }
}

fn determine_health_status(pipeline: &PipelineStatus) -> HealthStatus {
    if pipeline
        .pools
        .iter()
        .any(|pool| pool.size > 0 && pool.active == 0)
    {
        return HealthStatus::Unhealthy;
    }
    if pipeline.stopping || pipeline.pools.iter().any(|pool| pool.active < pool.size) {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
