//! Common test utilities for hook-relay-api integration tests
//!
//! This module provides:
//! - A router wired to a real [`HttpTriggerClient`] pointed at a wiremock
//!   server standing in for the build trigger API
//! - Request helpers that run a webhook through the router
//! - Accessors for the trigger bodies the mock server received

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use hook_relay_api::{create_router, AppState, HttpTriggerClient, ServiceConfig, ServiceMetrics};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Prometheus rejects duplicate registrations, so one instance per test binary.
static TEST_METRICS: OnceLock<Arc<ServiceMetrics>> = OnceLock::new();

pub fn test_metrics() -> Arc<ServiceMetrics> {
    TEST_METRICS
        .get_or_init(|| ServiceMetrics::new().expect("ServiceMetrics::new must succeed in tests"))
        .clone()
}

/// Start a mock trigger API that accepts every build request.
pub async fn start_trigger_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/app/[^/]+/build/start\.json$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "status": "ok",
            "message": "webhook processed",
            "service": "bitrise",
            "build_number": 1,
            "build_url": "https://app.example.com/build/1",
            "triggered_workflow": "primary"
        })))
        .mount(&server)
        .await;
    server
}

/// Router whose trigger client sends to `server`
pub fn app_for(server: &MockServer) -> Router {
    app_with_config(server, ServiceConfig::default())
}

#[allow(dead_code)]
pub fn app_with_config(server: &MockServer, mut config: ServiceConfig) -> Router {
    config.trigger.api_base_url = server.uri();
    let client = HttpTriggerClient::new(&config.trigger).expect("mock server URI is valid");
    create_router(AppState::new(config, Arc::new(client), test_metrics()))
}

/// POST a webhook and return the status with the parsed JSON body.
pub async fn post_webhook(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(body.into()).expect("valid request");

    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Trigger request bodies received by the mock API, in arrival order.
pub async fn received_triggers(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("trigger body is JSON"))
        .collect()
}

/// Paths of the trigger requests received by the mock API.
#[allow(dead_code)]
pub async fn received_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect()
}
