//! # Hook Relay HTTP Service
//!
//! HTTP surface of the Hook Relay webhook gateway.
//!
//! This crate provides:
//! - Webhook endpoints that select a provider, transform the payload and
//!   forward each resulting trigger to the build trigger API
//! - Health and Prometheus metrics endpoints
//! - The server bootstrap with graceful shutdown

pub mod config;
pub mod errors;
pub mod metrics;
pub mod signature;
pub mod trigger_client;

pub use config::{LoggingConfig, SecurityConfig, ServerConfig, ServiceConfig, TriggerConfig};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use metrics::ServiceMetrics;
pub use signature::{SharedSecretValidator, SignatureError};
pub use trigger_client::{HttpTriggerClient, TriggerClient, TriggerClientError};

use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use hook_relay_core::{
    classify, extract_metric_event, is_skip_build_by_commit_message, AggregatedResponse,
    ChatMessage, EntryOutcome, ProviderKind, RequestHeaders, SkipResponse, Timestamp,
    TransformResult, TriggerEntry, WebhookRequest,
};
use metrics::outcome;
use serde::Serialize;
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Client used for every downstream trigger call
    pub trigger_client: Arc<dyn TriggerClient>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,

    /// Present when `security.webhook_secret` is configured
    pub signature_validator: Option<Arc<SharedSecretValidator>>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        trigger_client: Arc<dyn TriggerClient>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let signature_validator = config
            .security
            .webhook_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| Arc::new(SharedSecretValidator::new(secret)));

        Self {
            config,
            trigger_client,
            metrics,
            signature_validator,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route(
            "/h/{service_id}/{app_slug}/{api_token}",
            post(handle_service_webhook),
        )
        .route("/h/{app_slug}/{api_token}", post(handle_detected_webhook))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    let health_routes = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
///
/// Runs until SIGINT or SIGTERM. In-flight requests then get
/// `server.shutdown_timeout_seconds` to finish before the server stops.
pub async fn start_server(
    config: ServiceConfig,
    trigger_client: Arc<dyn TriggerClient>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let state = AppState::new(config.clone(), trigger_client, metrics);
    let app = create_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Starting HTTP server");

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let drain_deadline = async {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?,
        _ = drain_deadline => {
            warn!("Graceful shutdown timed out; dropping in-flight requests");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle `POST /h/{service_id}/{app_slug}/{api_token}`
#[instrument(skip_all, fields(service_id = %service_id, app_slug = %app_slug))]
pub async fn handle_service_webhook(
    State(state): State<AppState>,
    Path((service_id, app_slug, api_token)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, WebhookHandlerError> {
    let Some(provider) = ProviderKind::from_service_id(&service_id) else {
        state.metrics.record_request(None);
        return Err(WebhookHandlerError::UnknownService { service_id });
    };

    let request = read_webhook_request(&state, &headers, body)?;
    relay_webhook(state, provider, request, app_slug, api_token).await
}

/// Handle `POST /h/{app_slug}/{api_token}`, picking the provider from headers
#[instrument(skip_all, fields(app_slug = %app_slug))]
pub async fn handle_detected_webhook(
    State(state): State<AppState>,
    Path((app_slug, api_token)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, WebhookHandlerError> {
    let request = read_webhook_request(&state, &headers, body)?;

    let classification = classify(&request.headers);
    let Some(provider) = classification.provider else {
        state.metrics.record_request(None);
        return Err(WebhookHandlerError::ProviderNotDetected);
    };

    if classification.unsupported_event {
        debug!(provider = %provider, "Event is outside the set this provider handles");
    }

    relay_webhook(state, provider, request, app_slug, api_token).await
}

fn read_webhook_request(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<WebhookRequest, WebhookHandlerError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            WebhookHandlerError::PayloadTooLarge {
                max_size: state.config.server.max_body_size,
            }
        } else {
            WebhookHandlerError::InvalidBody {
                message: rejection.body_text(),
            }
        }
    })?;

    let request_headers: RequestHeaders = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();

    Ok(WebhookRequest::new(request_headers, body))
}

/// Run one webhook through signature check, transform and triggers
#[instrument(skip_all, fields(provider = %provider, app_slug = %app_slug))]
async fn relay_webhook(
    state: AppState,
    provider: ProviderKind,
    request: WebhookRequest,
    app_slug: String,
    api_token: String,
) -> Result<Response, WebhookHandlerError> {
    state.metrics.record_request(Some(provider));

    if let Some(validator) = &state.signature_validator {
        validator
            .validate(&request.headers, &request.body)
            .map_err(|e| WebhookHandlerError::InvalidSignature {
                message: e.to_string(),
            })?;
    }

    spawn_metric_extraction(state.metrics.clone(), provider, request.clone());

    let response = match provider.transform(&request) {
        TransformResult::Skip { reason } => {
            info!(reason = %reason, "Webhook skipped");
            state.metrics.record_trigger_outcome(outcome::SKIPPED);
            AggregatedResponse::from_skip(reason)
        }
        TransformResult::Error(error) => {
            state.metrics.record_trigger_outcome(outcome::ERROR);
            AggregatedResponse::from_error(error.to_string())
        }
        TransformResult::Triggers {
            entries,
            dont_wait_for_trigger_response: true,
        } => {
            let count = entries.len();
            info!(entries = count, "Triggering builds without waiting for responses");
            tokio::spawn(async move {
                let response = run_triggers(&state, &app_slug, &api_token, entries).await;
                info!(
                    status = response.status_code(),
                    errors = response.errors.len(),
                    "Detached triggers finished"
                );
            });
            return Ok(render_accepted(provider, count));
        }
        TransformResult::Triggers { entries, .. } => {
            run_triggers(&state, &app_slug, &api_token, entries).await
        }
    };

    Ok(render_response(provider, &response))
}

/// Trigger each entry in order, skipping entries marked with a skip-ci keyword
async fn run_triggers(
    state: &AppState,
    app_slug: &str,
    api_token: &str,
    entries: Vec<TriggerEntry>,
) -> AggregatedResponse {
    let mut response = AggregatedResponse::new();

    for entry in entries {
        let skip_ci = entry
            .build_params
            .commit_message
            .as_deref()
            .is_some_and(is_skip_build_by_commit_message);
        if skip_ci {
            debug!(triggered_by = %entry.triggered_by, "Commit message asks to skip CI");
            state.metrics.record_trigger_outcome(outcome::SKIPPED);
            response.add_outcome(EntryOutcome::Skipped(SkipResponse::skip_ci(&entry)));
            continue;
        }

        match state
            .trigger_client
            .trigger(app_slug, api_token, &entry)
            .await
        {
            Ok(trigger_outcome) => {
                if trigger_outcome.is_success {
                    state.metrics.record_trigger_outcome(outcome::SUCCESS);
                } else {
                    warn!(
                        message = %trigger_outcome.response.message,
                        "Build trigger was rejected"
                    );
                    state.metrics.record_trigger_outcome(outcome::FAILED);
                }
                response.add_outcome(EntryOutcome::Triggered(trigger_outcome));
            }
            Err(e) => {
                error!(error = %e, "Build trigger call failed");
                state.metrics.record_trigger_outcome(outcome::ERROR);
                response.add_error(format!("Failed to trigger build: {}", e));
            }
        }
    }

    response
}

/// Derive and count an observability event off the request path
fn spawn_metric_extraction(
    metrics: Arc<ServiceMetrics>,
    provider: ProviderKind,
    request: WebhookRequest,
) {
    let received_at = Timestamp::now();
    tokio::spawn(async move {
        match extract_metric_event(provider, &request, received_at) {
            Ok(Some(event)) => {
                debug!(
                    provider = %provider,
                    kind = event.kind.as_str(),
                    repository = ?event.repository,
                    "Observed webhook event"
                );
                metrics.record_observed_event(&event);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(provider = %provider, error = %e, "Could not extract metric event");
            }
        }
    });
}

fn render_response(provider: ProviderKind, response: &AggregatedResponse) -> Response {
    if provider.renders_chat_response() {
        return (StatusCode::OK, Json(ChatMessage::from(response))).into_response();
    }

    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

fn render_accepted(provider: ProviderKind, count: usize) -> Response {
    let text = format!("Starting {} build(s)", count);
    if provider.renders_chat_response() {
        return (StatusCode::OK, Json(ChatMessage { text })).into_response();
    }
    (StatusCode::OK, Json(MessageResponse { message: text })).into_response()
}

// ============================================================================
// Health Check Handlers
// ============================================================================

#[instrument(skip_all)]
async fn handle_root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to Hook Relay!".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        time: Timestamp::now(),
    })
}

/// Basic health check endpoint
#[instrument(skip_all)]
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        environment: state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(_state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Takes `x-correlation-id` from the request or generates one, records it on
/// the span and in request extensions, and echoes it in the response.
/// Webhook URLs carry the API token, so only the route shape is logged.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let path = redacted_path(request.uri().path());
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Replace the trailing API token of a webhook path with a placeholder
fn redacted_path(path: &str) -> String {
    match path.strip_prefix("/h/") {
        Some(rest) => match rest.rsplit_once('/') {
            Some((head, _token)) => format!("/h/{}/<token>", head),
            None => path.to_string(),
        },
        None => path.to_string(),
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of `GET /`
#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub version: String,
    pub time: Timestamp,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub environment: String,
    pub version: String,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
