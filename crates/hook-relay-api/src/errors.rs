//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// These cover failures that happen before a provider transform runs. Once a
/// transform has produced a result, the answer is an aggregated response
/// instead, even for transform errors.
///
/// - `400 Bad Request`: provider cannot be determined or body unreadable
/// - `401 Unauthorized`: shared-secret check failed
/// - `404 Not Found`: unknown service id in the URL
/// - `413 Payload Too Large`: body exceeds the configured limit
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// The `{service_id}` URL segment names no known provider
    #[error("Unsupported webhook service: {service_id}")]
    UnknownService { service_id: String },

    /// No service id given and the headers match zero or several providers
    #[error("Unable to determine the webhook provider from the request headers")]
    ProviderNotDetected,

    /// Signature or token header missing or wrong
    #[error("Webhook signature validation failed: {message}")]
    InvalidSignature { message: String },

    /// Body exceeds `server.max_body_size`
    #[error("Payload too large (max: {max_size} bytes)")]
    PayloadTooLarge { max_size: usize },

    /// Body could not be read from the connection
    #[error("Failed to read request body: {message}")]
    InvalidBody { message: String },
}

impl WebhookHandlerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownService { .. } => StatusCode::NOT_FOUND,
            Self::ProviderNotDetected | Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidSignature { .. } => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::UnknownService { service_id } => {
                warn!(service_id = %service_id, "Webhook service not found");
            }
            Self::ProviderNotDetected => {
                warn!("Webhook provider could not be detected from headers");
            }
            Self::InvalidSignature { message } => {
                warn!(error = %message, "Webhook signature rejected");
            }
            Self::PayloadTooLarge { max_size } => {
                warn!(max_size = max_size, "Payload too large");
            }
            Self::InvalidBody { message } => {
                error!(error = %message, "Failed to read webhook body");
            }
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
