//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default downstream build trigger API.
pub const DEFAULT_TRIGGER_API_BASE_URL: &str = "https://app.bitrise.io";

/// Environment name that enables logging of outgoing trigger bodies.
pub const DEVELOPMENT_ENVIRONMENT: &str = "development";

/// Service configuration
///
/// Every field carries a serde default so that a partial file, or no file at
/// all, still yields a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Downstream build trigger settings
    pub trigger: TriggerConfig,

    /// Shared-secret checks on incoming webhooks
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Deployment environment name (`development`, `production`, ...)
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            trigger: TriggerConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            environment: DEVELOPMENT_ENVIRONMENT.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Check the configuration for values that would make the service unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.trigger.validate()?;
        self.logging.validate()?;

        if self.environment.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "environment".to_string(),
            });
        }

        Ok(())
    }

    /// True when running in the development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEVELOPMENT_ENVIRONMENT)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            shutdown_timeout_seconds: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Downstream build trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Base URL of the build trigger API
    pub api_base_url: String,

    /// Replaces `api_base_url` for every trigger when set
    ///
    /// Debugging aid: point it at a request bin to inspect outgoing calls.
    pub send_requests_to: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent sent with trigger requests
    pub user_agent: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_TRIGGER_API_BASE_URL.to_string(),
            send_requests_to: None,
            timeout_seconds: 30,
            user_agent: format!("hook-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TriggerConfig {
    /// Base URL every trigger request goes to
    pub fn effective_base_url(&self) -> &str {
        self.send_requests_to
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(&self.api_base_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.effective_base_url();
        let url = url::Url::parse(base).map_err(|e| ConfigError::Invalid {
            message: format!("trigger base URL '{}' is not a valid URL: {}", base, e),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                message: format!(
                    "trigger base URL '{}' must use http or https, got '{}'",
                    base,
                    url.scheme()
                ),
            });
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "trigger.timeout_seconds must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Shared-secret configuration for incoming webhooks
///
/// When `webhook_secret` is set, every webhook must carry either a valid
/// `X-Hub-Signature-256` HMAC or a matching `X-Gitlab-Token` header.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Invalid {
                message: format!("Invalid log level: {}", self.level),
            }),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
