//! Ingest Pipeline Integration Tests
//!
//! Drives the HTTP router against a running ingest pipeline backed by the
//! in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::time::timeout;
use tower::ServiceExt;

use stock_relay::{
    BrokerClientPort, FatalError, HttpState, InMemoryBroker, LoggingSink, Pipeline, PipelineMode,
    PipelineSettings, PipelineStats, router,
};

async fn start_ingest(broker: &InMemoryBroker) -> Pipeline {
    let mut settings = PipelineSettings::for_mode(PipelineMode::Ingest);
    settings.writer_workers = 2;
    settings.shutdown_timeout = Duration::from_secs(2);
    Pipeline::start(
        settings,
        broker,
        Arc::new(LoggingSink),
        Arc::new(PipelineStats::new()),
    )
    .await
    .unwrap()
}

fn app(pipeline: &Pipeline) -> Router {
    router(Arc::new(HttpState::new(
        "test-0.0.1".to_string(),
        pipeline.monitor(),
        pipeline.ingest_service(),
    )))
}

fn post_stock(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/stock")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_appended(broker: &InMemoryBroker, count: i64) {
    timeout(Duration::from_secs(2), async {
        while broker.appended() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("records were not published in time");
}

#[tokio::test]
async fn valid_record_is_published_to_broker() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;

    let response = app(&pipeline)
        .oneshot(post_stock(
            json!({"id": 1, "name": "ACME", "price": 10.5}).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        json_body(response).await,
        json!({"message": "Successfully added stock."})
    );

    wait_for_appended(&broker, 1).await;
    let message = broker.consumer().unwrap().poll().await.unwrap();
    assert_eq!(message.key, b"ACME".to_vec());
    assert_eq!(message.value, b"10.500000".to_vec());

    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn invalid_records_are_rejected_with_reason() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;
    let monitor = pipeline.monitor();

    let cases = [
        (json!({"id": 1, "name": "", "price": 1.0}), "Name cannot be empty"),
        (json!({"name": "ACME", "price": 1.0}), "ID cannot be empty"),
        (
            json!({"id": 1, "name": "ACME", "price": -0.01}),
            "Price must be a non-negative number",
        ),
    ];

    for (body, reason) in cases {
        let response = app(&pipeline)
            .oneshot(post_stock(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": reason}));
    }

    assert_eq!(monitor.status().stats.rejected, 3);
    assert_eq!(broker.appended(), 0);
    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;

    for body in ["{", r#"{"id": "one", "name": "ACME", "price": 1}"#] {
        let response = app(&pipeline)
            .oneshot(post_stock(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    assert_eq!(broker.appended(), 0);
    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn publish_failure_drops_record_and_keeps_serving() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;
    let monitor = pipeline.monitor();
    broker.fail_next_publishes(1);

    for (id, name) in [(1, "FIRST"), (2, "SECOND")] {
        let response = app(&pipeline)
            .oneshot(post_stock(
                json!({"id": id, "name": name, "price": 3.0}).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    wait_for_appended(&broker, 1).await;
    timeout(Duration::from_secs(2), async {
        while monitor.status().stats.publish_failures < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let stats = monitor.status().stats;
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.publish_failures, 1);
    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn health_endpoints_report_running_pipeline() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;

    let response = app(&pipeline)
        .oneshot(
            Request::builder()
                .uri("/api/v1/healthcheck")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&pipeline)
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&pipeline)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], "test-0.0.1");
    assert_eq!(body["pipeline"]["mode"], "ingest");
    assert_eq!(body["pipeline"]["pools"][0]["name"], "writer");
    assert_eq!(body["pipeline"]["pools"][0]["active"], 2);

    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn submit_after_shutdown_is_unavailable() {
    let broker = InMemoryBroker::new();
    let pipeline = start_ingest(&broker).await;
    let router = app(&pipeline);

    assert!(pipeline.shutdown().await);

    let response = router
        .oneshot(post_stock(
            json!({"id": 1, "name": "LATE", "price": 1.0}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(broker.appended(), 0);
}

#[tokio::test]
async fn unreachable_broker_fails_startup() {
    let broker = InMemoryBroker::new();
    broker.set_unreachable(true);

    let result = Pipeline::start(
        PipelineSettings::for_mode(PipelineMode::Ingest),
        &broker,
        Arc::new(LoggingSink),
        Arc::new(PipelineStats::new()),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, FatalError::BrokerUnavailable(_)));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn submit_route_absent_in_aggregate_mode() {
    let broker = InMemoryBroker::new();
    let pipeline = Pipeline::start(
        PipelineSettings::for_mode(PipelineMode::Aggregate),
        &broker,
        Arc::new(LoggingSink),
        Arc::new(PipelineStats::new()),
    )
    .await
    .unwrap();
    assert!(pipeline.ingest_service().is_none());

    let response = app(&pipeline)
        .oneshot(post_stock(
            json!({"id": 1, "name": "ACME", "price": 1.0}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(pipeline.shutdown().await);
}

#[tokio::test]
async fn zero_writers_fails_startup() {
    let broker = InMemoryBroker::new();
    let mut settings = PipelineSettings::for_mode(PipelineMode::Ingest);
    settings.writer_workers = 0;

    let err = Pipeline::start(
        settings,
        &broker,
        Arc::new(LoggingSink),
        Arc::new(PipelineStats::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, FatalError::Config(_)));
    assert_eq!(err.exit_code(), 2);
}
