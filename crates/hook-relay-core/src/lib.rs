//! # Hook Relay Core
//!
//! Normalization engine for the Hook Relay webhook gateway.
//!
//! This crate turns provider-specific webhook requests (GitHub, GitLab,
//! Bitbucket, Slack and others) into canonical build triggers, and folds the
//! outcomes of those triggers into a single HTTP answer. Everything here is
//! request-scoped and synchronous: no I/O, no clocks in the transform path, no
//! shared mutable state.
//!
//! ## Architecture
//!
//! - [`classifier`] picks a provider from request headers
//! - [`providers`] decodes and transforms each provider's payloads
//! - [`skip_ci`] and [`ready_state`] hold rules shared by every provider
//! - [`response`] aggregates per-trigger outcomes
//! - [`metrics_extractor`] derives best-effort observability events
//!
//! ## Usage
//!
//! ```rust
//! use hook_relay_core::providers::ProviderKind;
//! use hook_relay_core::webhook::{RequestHeaders, WebhookRequest};
//!
//! let mut headers = RequestHeaders::new();
//! headers.insert("Content-Type", "application/json");
//! headers.insert("X-Github-Event", "ping");
//! let request = WebhookRequest::new(headers, "{}");
//!
//! let result = ProviderKind::GitHub.transform(&request);
//! assert!(result.should_skip());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp attached to observability events.
///
/// Never read inside a transform; only the caller stamps events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for status mapping and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed request headers
    Header,
    /// Unsupported media type
    ContentType,
    /// Body could not be decoded
    Decode,
    /// Well-formed payload missing semantic fields
    Validation,
    /// Recognised platform, unhandled event or action
    UnsupportedEvent,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::ContentType => "content_type",
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::UnsupportedEvent => "unsupported_event",
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Canonical build trigger types
pub mod build_params;

/// Header-based provider classification
pub mod classifier;

/// Observability events derived from raw payloads
pub mod metrics_extractor;

/// Per-platform payload transformations
pub mod providers;

/// Pull request ready-state resolution
pub mod ready_state;

/// Trigger outcome aggregation
pub mod response;

/// Skip-CI commit message markers
pub mod skip_ci;

/// Request model, transform errors and results
pub mod webhook;

// Re-export key types for convenience
pub use build_params::{
    CanonicalBuildParams, CommitPaths, EnvironmentItem, PullRequestReadyState, TriggerEntry,
};
pub use classifier::{classify, Classification};
pub use metrics_extractor::{extract_metric_event, MetricEvent, MetricEventKind};
pub use providers::ProviderKind;
pub use ready_state::{resolve_ready_state, ReadyTransition};
pub use response::{
    AggregatedResponse, ChatMessage, EntryOutcome, SkipResponse, TriggerApiResponse,
    TriggerOutcome,
};
pub use skip_ci::is_skip_build_by_commit_message;
pub use webhook::{RequestHeaders, TransformError, TransformResult, WebhookRequest};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
