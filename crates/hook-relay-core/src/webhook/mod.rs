//! # Webhook Request Model
//!
//! Raw request representation handed to providers, the error taxonomy of the
//! transform step, and the [`TransformResult`] every provider returns.

use crate::{build_params::TriggerEntry, ErrorCategory};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Core Types
// ============================================================================

/// HTTP headers of an inbound webhook, keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    values: BTreeMap<String, String>,
}

impl RequestHeaders {
    /// Create an empty header set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value under the same name
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Get a header value by case-insensitive name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get a non-empty header value or fail with a header error naming it
    pub fn require(&self, name: &str) -> Result<&str, TransformError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(TransformError::missing_header(name)),
        }
    }

    /// True when the header is present
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(lowercase name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Raw HTTP request data of a webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: RequestHeaders,
    pub body: Bytes,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(headers: RequestHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Media type of the body without parameters, lowercased.
    ///
    /// `application/json; charset=utf-8` yields `application/json`.
    pub fn media_type(&self) -> Option<String> {
        self.headers.get("Content-Type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Require a Content-Type header whose media type is one of `allowed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Header`] when the header is missing and
    /// [`TransformError::ContentType`] when the media type is not accepted.
    pub fn require_media_type(&self, allowed: &[&str]) -> Result<String, TransformError> {
        let raw = self.headers.require("Content-Type")?;
        let media_type = self.media_type().unwrap_or_default();

        if allowed.iter().any(|a| *a == media_type) {
            Ok(media_type)
        } else {
            Err(TransformError::ContentType {
                content_type: raw.to_string(),
            })
        }
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Decode`] for an empty or malformed body.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, TransformError> {
        decode_json_bytes(&self.body)
    }

    /// Decode an `application/x-www-form-urlencoded` body into its fields.
    ///
    /// Later occurrences of a key replace earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Decode`] when the body or a field is not
    /// valid UTF-8 after percent decoding.
    pub fn form_fields(&self) -> Result<HashMap<String, String>, TransformError> {
        let body = std::str::from_utf8(&self.body).map_err(|e| TransformError::Decode {
            message: format!("form body is not valid UTF-8: {e}"),
        })?;

        let mut fields = HashMap::new();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            fields.insert(decode_form_component(key)?, decode_form_component(value)?);
        }
        Ok(fields)
    }
}

fn decode_form_component(raw: &str) -> Result<String, TransformError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| TransformError::Decode {
            message: format!("invalid form encoding: {e}"),
        })
}

/// Decode JSON bytes, mapping failures to [`TransformError::Decode`].
pub fn decode_json_bytes<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransformError> {
    if body.is_empty() {
        return Err(TransformError::Decode {
            message: "request body is empty".to_string(),
        });
    }
    serde_json::from_slice(body).map_err(|e| TransformError::Decode {
        message: format!("failed to parse request body as JSON: {e}"),
    })
}

// ============================================================================
// Error Types
// ============================================================================

/// Hard failures of the transform step. Every variant maps to a client error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("{message}")]
    Header { message: String },

    #[error("Content-Type is not supported: {content_type}")]
    ContentType { content_type: String },

    #[error("Failed to decode request body: {message}")]
    Decode { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    UnsupportedEvent { message: String },
}

impl TransformError {
    /// Header error for a missing required header
    pub fn missing_header(name: &str) -> Self {
        Self::Header {
            message: format!("Missing required header: {name}"),
        }
    }

    /// Validation error with a message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Unsupported event error with a message
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedEvent {
            message: message.into(),
        }
    }

    /// Get error category for status mapping and metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Header { .. } => ErrorCategory::Header,
            Self::ContentType { .. } => ErrorCategory::ContentType,
            Self::Decode { .. } => ErrorCategory::Decode,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::UnsupportedEvent { .. } => ErrorCategory::UnsupportedEvent,
        }
    }
}

// ============================================================================
// Transform Result
// ============================================================================

/// Outcome of transforming a single webhook request.
///
/// Exactly three shapes exist: triggers, a skip, or a hard error. Entries are
/// never combined with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// One or more builds should be started.
    Triggers {
        entries: Vec<TriggerEntry>,
        dont_wait_for_trigger_response: bool,
    },

    /// Recognised and well-formed, but no build should start.
    Skip { reason: String },

    /// The request could not be transformed.
    Error(TransformError),
}

impl TransformResult {
    /// Triggers that wait for the downstream response
    pub fn triggers(entries: Vec<TriggerEntry>) -> Self {
        Self::Triggers {
            entries,
            dont_wait_for_trigger_response: false,
        }
    }

    /// A skip with a diagnostic reason
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }

    /// Entries to trigger; empty for skips and errors
    pub fn entries(&self) -> &[TriggerEntry] {
        match self {
            Self::Triggers { entries, .. } => entries,
            _ => &[],
        }
    }

    /// Consume the result, returning its entries
    pub fn into_entries(self) -> Vec<TriggerEntry> {
        match self {
            Self::Triggers { entries, .. } => entries,
            _ => Vec::new(),
        }
    }

    /// True for a recognised event that must not start a build
    pub fn should_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// Reason given for a skip
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skip { reason } => Some(reason),
            _ => None,
        }
    }

    /// The hard error, if the transform failed
    pub fn error(&self) -> Option<&TransformError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// True when the caller should answer before the triggers complete
    pub fn dont_wait_for_trigger_response(&self) -> bool {
        matches!(
            self,
            Self::Triggers {
                dont_wait_for_trigger_response: true,
                ..
            }
        )
    }
}

impl From<TransformError> for TransformResult {
    fn from(error: TransformError) -> Self {
        Self::Error(error)
    }
}

impl From<Result<TransformResult, TransformError>> for TransformResult {
    fn from(result: Result<TransformResult, TransformError>) -> Self {
        result.unwrap_or_else(Self::Error)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
