//! Trigger outcome aggregation.
//!
//! One webhook can produce several trigger entries. Each ends as a downstream
//! success, a downstream failure, or a local skip; together with any
//! transform errors they fold into one [`AggregatedResponse`] whose status
//! code callers branch on.

use crate::build_params::TriggerEntry;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const SKIP_CI_MESSAGE: &str =
    "Build skipped because the commit message included a skip ci keyword ([skip ci] or [ci skip]).";

// ============================================================================
// Per-entry outcomes
// ============================================================================

/// Body returned by the downstream build trigger endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerApiResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub triggered_workflow: String,
}

/// Result of one downstream trigger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub response: TriggerApiResponse,
    pub is_success: bool,
}

/// An entry that was not sent downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl SkipResponse {
    /// Skip of a whole request, carrying only the reason
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            message: reason.into(),
            ..Default::default()
        }
    }

    /// Skip of an entry whose commit message carries a skip-ci marker
    pub fn skip_ci(entry: &TriggerEntry) -> Self {
        let params = &entry.build_params;
        Self {
            message: SKIP_CI_MESSAGE.to_string(),
            commit_hash: params.commit_hash.clone(),
            commit_message: params.commit_message.clone(),
            branch: params.branch.clone(),
        }
    }
}

/// What happened to a single trigger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Triggered(TriggerOutcome),
    Skipped(SkipResponse),
}

// ============================================================================
// Aggregation
// ============================================================================

/// Combined response for one webhook request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_responses: Vec<TriggerApiResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_responses: Vec<TriggerApiResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_responses: Vec<SkipResponse>,
}

impl AggregatedResponse {
    /// Create an empty response
    pub fn new() -> Self {
        Self::default()
    }

    /// Response for a request that failed before any trigger call
    pub fn from_error(error: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.add_error(error);
        response
    }

    /// Response for a request skipped as a whole
    pub fn from_skip(reason: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.add_skipped(SkipResponse::with_reason(reason));
        response
    }

    /// Fold per-entry outcomes, in order
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = EntryOutcome>) -> Self {
        let mut response = Self::new();
        for outcome in outcomes {
            response.add_outcome(outcome);
        }
        response
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn add_skipped(&mut self, skipped: SkipResponse) {
        self.skipped_responses.push(skipped);
    }

    pub fn add_outcome(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Triggered(TriggerOutcome {
                response,
                is_success: true,
            }) => self.success_responses.push(response),
            EntryOutcome::Triggered(TriggerOutcome { response, .. }) => {
                self.failed_responses.push(response)
            }
            EntryOutcome::Skipped(skipped) => self.skipped_responses.push(skipped),
        }
    }

    /// True when any error or downstream failure is present
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty() || !self.failed_responses.is_empty()
    }

    /// HTTP status for the response.
    ///
    /// Any error or failure wins with 400, regardless of successes. With no
    /// successes and at least one skip the answer is 200. Everything else is
    /// 201.
    ///
    /// ```rust
    /// use hook_relay_core::AggregatedResponse;
    ///
    /// assert_eq!(AggregatedResponse::from_skip("ping").status_code(), 200);
    /// assert_eq!(AggregatedResponse::from_error("bad").status_code(), 400);
    /// ```
    pub fn status_code(&self) -> u16 {
        if self.has_failures() {
            400
        } else if self.success_responses.is_empty() && !self.skipped_responses.is_empty() {
            200
        } else {
            201
        }
    }

    /// Human-readable rendering for chat integrations
    pub fn chat_text(&self) -> String {
        let mut text = String::new();

        for error in &self.errors {
            let _ = writeln!(text, "*[!] Error*: {error}");
        }
        for failed in &self.failed_responses {
            let _ = writeln!(text, "*[!] Failed to start a build*: {}", failed.message);
        }
        for success in &self.success_responses {
            let workflow = if success.triggered_workflow.is_empty() {
                String::new()
            } else {
                format!(" ({})", success.triggered_workflow)
            };
            match success.build_number {
                Some(number) => {
                    let _ = writeln!(text, "Triggered build #{number}{workflow}: {}", success.build_url);
                }
                None => {
                    let _ = writeln!(text, "Triggered build{workflow}: {}", success.message);
                }
            }
        }
        for skipped in &self.skipped_responses {
            let _ = writeln!(text, "Skipped: {}", skipped.message);
        }

        text.trim_end().to_string()
    }
}

/// Body shape Slack renders as a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
}

impl From<&AggregatedResponse> for ChatMessage {
    fn from(response: &AggregatedResponse) -> Self {
        Self {
            text: response.chat_text(),
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
