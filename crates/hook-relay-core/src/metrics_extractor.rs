//! Best-effort observability events.
//!
//! Runs off the same raw request as the transform but shares nothing with
//! it: a payload that cannot be read here only yields an error for the caller
//! to log, and never influences trigger handling.

use crate::{
    providers::{decode_json_or_form_payload, ProviderKind},
    webhook::{TransformError, WebhookRequest},
    Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of activity observed in a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricEventKind {
    Push,
    PullRequestOpened,
    PullRequestUpdated,
    PullRequestClosed,
}

impl MetricEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequestOpened => "pull_request_opened",
            Self::PullRequestUpdated => "pull_request_updated",
            Self::PullRequestClosed => "pull_request_closed",
        }
    }
}

/// An observed repository activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub provider: ProviderKind,
    pub kind: MetricEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<u64>,
    pub received_at: Timestamp,
}

/// Failure to read an event; logged by the caller and otherwise ignored.
#[derive(Debug, thiserror::Error)]
pub enum MetricsExtractionError {
    #[error("Missing event header: {0}")]
    MissingEventHeader(&'static str),

    #[error("Unreadable payload: {0}")]
    Payload(#[from] TransformError),
}

/// Derive an observability event from a raw request.
///
/// Returns `Ok(None)` for providers or events that carry nothing of
/// interest. `received_at` is supplied by the caller so extraction itself
/// stays free of clocks.
pub fn extract_metric_event(
    provider: ProviderKind,
    request: &WebhookRequest,
    received_at: Timestamp,
) -> Result<Option<MetricEvent>, MetricsExtractionError> {
    let Some(header) = provider.event_header() else {
        return Ok(None);
    };
    let event = request
        .headers
        .get(header)
        .ok_or(MetricsExtractionError::MissingEventHeader(header))?;

    let observation = match provider {
        ProviderKind::GitHub => observe_github(event, &read_payload(request)?),
        ProviderKind::GitLab => observe_gitlab(event, &read_payload(request)?),
        ProviderKind::BitbucketCloud => observe_bitbucket(event, &read_payload(request)?),
        _ => None,
    };

    Ok(observation.map(|o| MetricEvent {
        provider,
        kind: o.kind,
        repository: o.repository,
        git_ref: o.git_ref,
        pull_request_id: o.pull_request_id,
        received_at,
    }))
}

struct Observation {
    kind: MetricEventKind,
    repository: Option<String>,
    git_ref: Option<String>,
    pull_request_id: Option<u64>,
}

fn read_payload(request: &WebhookRequest) -> Result<Value, TransformError> {
    decode_json_or_form_payload(request, &request.media_type().unwrap_or_default())
}

fn text(payload: &Value, pointer: &str) -> Option<String> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn observe_github(event: &str, payload: &Value) -> Option<Observation> {
    let repository = text(payload, "/repository/full_name");
    match event {
        "push" => Some(Observation {
            kind: MetricEventKind::Push,
            repository,
            git_ref: text(payload, "/ref"),
            pull_request_id: None,
        }),
        "pull_request" => {
            let kind = match payload.get("action").and_then(Value::as_str)? {
                "opened" | "reopened" => MetricEventKind::PullRequestOpened,
                "closed" => MetricEventKind::PullRequestClosed,
                _ => MetricEventKind::PullRequestUpdated,
            };
            Some(Observation {
                kind,
                repository,
                git_ref: text(payload, "/pull_request/head/ref"),
                pull_request_id: payload.pointer("/pull_request/number").and_then(Value::as_u64),
            })
        }
        _ => None,
    }
}

fn observe_gitlab(event: &str, payload: &Value) -> Option<Observation> {
    let repository = text(payload, "/project/path_with_namespace");
    match event {
        "Push Hook" | "Tag Push Hook" => Some(Observation {
            kind: MetricEventKind::Push,
            repository,
            git_ref: text(payload, "/ref"),
            pull_request_id: None,
        }),
        "Merge Request Hook" => {
            let kind = match payload.pointer("/object_attributes/action").and_then(Value::as_str)? {
                "open" | "reopen" => MetricEventKind::PullRequestOpened,
                "close" | "merge" => MetricEventKind::PullRequestClosed,
                _ => MetricEventKind::PullRequestUpdated,
            };
            Some(Observation {
                kind,
                repository,
                git_ref: text(payload, "/object_attributes/source_branch"),
                pull_request_id: payload
                    .pointer("/object_attributes/iid")
                    .and_then(Value::as_u64),
            })
        }
        _ => None,
    }
}

fn observe_bitbucket(event: &str, payload: &Value) -> Option<Observation> {
    let repository = text(payload, "/repository/full_name");
    let pull_request = |kind| Observation {
        kind,
        repository: repository.clone(),
        git_ref: text(payload, "/pullrequest/source/branch/name"),
        pull_request_id: payload.pointer("/pullrequest/id").and_then(Value::as_u64),
    };
    match event {
        "repo:push" => Some(Observation {
            kind: MetricEventKind::Push,
            repository: repository.clone(),
            git_ref: text(payload, "/push/changes/0/new/name"),
            pull_request_id: None,
        }),
        "pullrequest:created" => Some(pull_request(MetricEventKind::PullRequestOpened)),
        "pullrequest:updated" => Some(pull_request(MetricEventKind::PullRequestUpdated)),
        "pullrequest:fulfilled" | "pullrequest:rejected" => {
            Some(pull_request(MetricEventKind::PullRequestClosed))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "metrics_extractor_tests.rs"]
mod tests;
