//! Downstream build trigger client.
//!
//! Each [`TriggerEntry`] becomes one POST to the build trigger API. The
//! client reports the parsed response together with whether the call
//! succeeded; it never retries.

use crate::config::TriggerConfig;
use async_trait::async_trait;
use hook_relay_core::{CanonicalBuildParams, TriggerApiResponse, TriggerEntry, TriggerOutcome};
use serde::Serialize;
use tracing::{debug, instrument};

/// `hook_info.type` sent with every trigger.
pub const HOOK_INFO_TYPE: &str = "bitrise";

/// Errors raised while calling the build trigger API
#[derive(Debug, thiserror::Error)]
pub enum TriggerClientError {
    #[error("Failed to create HTTP client: {message}")]
    Configuration { message: String },

    #[error("Trigger request failed: {message}")]
    Transport { message: String },

    #[error("Failed to decode trigger response (HTTP {status}): {message}")]
    Decode { status: u16, message: String },
}

/// Sends canonical triggers to the build trigger API
#[async_trait]
pub trait TriggerClient: Send + Sync {
    /// Start a build for `app_slug` using one trigger entry.
    ///
    /// A response that parses but reports a non-2xx status is an `Ok` outcome
    /// with `is_success == false`, not an error.
    async fn trigger(
        &self,
        app_slug: &str,
        api_token: &str,
        entry: &TriggerEntry,
    ) -> Result<TriggerOutcome, TriggerClientError>;
}

#[derive(Debug, Serialize)]
struct HookInfo<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    api_token: &'a str,
}

#[derive(Debug, Serialize)]
struct TriggerRequestBody<'a> {
    hook_info: HookInfo<'a>,
    build_params: &'a CanonicalBuildParams,
    triggered_by: &'a str,
}

/// [`TriggerClient`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTriggerClient {
    http_client: reqwest::Client,
    base_url: url::Url,
    log_request_bodies: bool,
}

impl HttpTriggerClient {
    /// Build a client from the trigger configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerClientError::Configuration`] if the base URL does not
    /// parse or the HTTP client cannot be created.
    pub fn new(config: &TriggerConfig) -> Result<Self, TriggerClientError> {
        let base = config.effective_base_url();
        let base_url = url::Url::parse(base).map_err(|e| TriggerClientError::Configuration {
            message: format!("invalid base URL '{}': {}", base, e),
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TriggerClientError::Configuration {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            base_url,
            log_request_bodies: false,
        })
    }

    /// Log every outgoing body at debug level
    pub fn with_request_body_logging(mut self, enabled: bool) -> Self {
        self.log_request_bodies = enabled;
        self
    }

    /// `{base}/app/{app_slug}/build/start.json`, with the slug percent-encoded
    pub fn trigger_url(&self, app_slug: &str) -> Result<url::Url, TriggerClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TriggerClientError::Configuration {
                message: format!("base URL '{}' cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(["app", app_slug, "build", "start.json"]);
        Ok(url)
    }
}

#[async_trait]
impl TriggerClient for HttpTriggerClient {
    #[instrument(skip(self, api_token, entry), fields(triggered_by = %entry.triggered_by))]
    async fn trigger(
        &self,
        app_slug: &str,
        api_token: &str,
        entry: &TriggerEntry,
    ) -> Result<TriggerOutcome, TriggerClientError> {
        let url = self.trigger_url(app_slug)?;
        let body = TriggerRequestBody {
            hook_info: HookInfo {
                kind: HOOK_INFO_TYPE,
                api_token,
            },
            build_params: &entry.build_params,
            triggered_by: &entry.triggered_by,
        };

        if self.log_request_bodies {
            // The token stays out of the log line.
            match serde_json::to_string(&entry.build_params) {
                Ok(params) => debug!(url = %url, build_params = %params, "Sending trigger request"),
                Err(e) => debug!(url = %url, error = %e, "Sending trigger request"),
            }
        }

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TriggerClientError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TriggerClientError::Transport {
                message: e.to_string(),
            })?;

        let parsed: TriggerApiResponse =
            serde_json::from_str(&text).map_err(|e| TriggerClientError::Decode {
                status: status.as_u16(),
                message: e.to_string(),
            })?;

        debug!(
            status = status.as_u16(),
            build_number = ?parsed.build_number,
            "Trigger response received"
        );

        Ok(TriggerOutcome {
            response: parsed,
            is_success: status.is_success(),
        })
    }
}

#[cfg(test)]
#[path = "trigger_client_tests.rs"]
mod tests;
