//! Header-based provider classification.
//!
//! Only headers are inspected, never the body, so classification is cheap
//! and side-effect free. Providers without a distinguishing header (VSTS,
//! Assembla, Slack, Passthrough) are reachable only through an explicit
//! service id.

use crate::{providers::ProviderKind, webhook::RequestHeaders};
use serde::Serialize;

/// User-Agent prefix sent by Bitbucket Cloud; Bitbucket Server sends others.
pub const BITBUCKET_CLOUD_USER_AGENT_PREFIX: &str = "Bitbucket-Webhooks/2.0";

/// Result of classifying a request by its headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// The provider that should handle the request, if exactly one matched.
    pub provider: Option<ProviderKind>,

    /// The provider is known but does not attempt this event type.
    ///
    /// Diagnostic only; dispatch still goes ahead so the provider can answer
    /// with its own descriptive error.
    pub unsupported_event: bool,
}

impl Classification {
    /// No provider matched
    pub fn none() -> Self {
        Self {
            provider: None,
            unsupported_event: false,
        }
    }
}

/// Classify a request by its provider-distinguishing headers.
///
/// Missing or ambiguous evidence (more than one provider's header present)
/// classifies as no provider.
///
/// ```rust
/// use hook_relay_core::{classify, ProviderKind, RequestHeaders};
///
/// let headers: RequestHeaders = [("X-Gitlab-Event", "Push Hook")].into_iter().collect();
/// let classification = classify(&headers);
/// assert_eq!(classification.provider, Some(ProviderKind::GitLab));
/// assert!(!classification.unsupported_event);
/// ```
pub fn classify(headers: &RequestHeaders) -> Classification {
    let mut candidates = Vec::with_capacity(1);

    if headers.contains("X-Github-Event") {
        candidates.push(ProviderKind::GitHub);
    }
    if headers.contains("X-Gitlab-Event") {
        candidates.push(ProviderKind::GitLab);
    }
    if headers.contains("X-Event-Key") {
        let is_cloud = headers
            .get("User-Agent")
            .is_some_and(|ua| ua.starts_with(BITBUCKET_CLOUD_USER_AGENT_PREFIX));
        candidates.push(if is_cloud {
            ProviderKind::BitbucketCloud
        } else {
            ProviderKind::BitbucketServer
        });
    }
    if headers.contains("X-Gogs-Event") {
        candidates.push(ProviderKind::Gogs);
    }
    if headers.contains("X-Deveo-Event") {
        candidates.push(ProviderKind::Deveo);
    }

    match candidates.as_slice() {
        [provider] => {
            let unsupported_event = provider
                .event_header()
                .and_then(|name| headers.get(name))
                .is_some_and(|event| !provider.supports_event(event));
            Classification {
                provider: Some(*provider),
                unsupported_event,
            }
        }
        _ => Classification::none(),
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
