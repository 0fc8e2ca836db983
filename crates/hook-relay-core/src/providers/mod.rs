//! # Providers
//!
//! One module per webhook platform. Each exposes a `transform` function from
//! [`WebhookRequest`] to `Result<TransformResult, TransformError>`;
//! [`ProviderKind`] is the closed set of them and the single dispatch point.

use crate::webhook::{decode_json_bytes, TransformError, TransformResult, WebhookRequest};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::{debug, instrument, warn};

pub mod assembla;
pub mod bitbucket_cloud;
pub mod bitbucket_server;
pub mod deveo;
pub mod github;
pub mod gitlab;
pub mod gogs;
pub mod passthrough;
pub mod slack;
pub mod visual_studio;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ============================================================================
// Provider Kind
// ============================================================================

/// Every supported webhook platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    #[serde(rename = "bitbucket-v2")]
    BitbucketCloud,
    #[serde(rename = "bitbucket-server")]
    BitbucketServer,
    #[serde(rename = "visualstudio")]
    VisualStudio,
    #[serde(rename = "gogs")]
    Gogs,
    #[serde(rename = "deveo")]
    Deveo,
    #[serde(rename = "assembla")]
    Assembla,
    #[serde(rename = "slack")]
    Slack,
    #[serde(rename = "passthrough")]
    Passthrough,
}

impl ProviderKind {
    /// All providers in routing-table order
    pub const ALL: [ProviderKind; 10] = [
        Self::GitHub,
        Self::GitLab,
        Self::BitbucketCloud,
        Self::BitbucketServer,
        Self::VisualStudio,
        Self::Gogs,
        Self::Deveo,
        Self::Assembla,
        Self::Slack,
        Self::Passthrough,
    ];

    /// Service id used in the `/h/{service_id}/...` route
    pub fn id(&self) -> &'static str {
        match self {
            Self::GitHub => github::PROVIDER_ID,
            Self::GitLab => gitlab::PROVIDER_ID,
            Self::BitbucketCloud => bitbucket_cloud::PROVIDER_ID,
            Self::BitbucketServer => bitbucket_server::PROVIDER_ID,
            Self::VisualStudio => visual_studio::PROVIDER_ID,
            Self::Gogs => gogs::PROVIDER_ID,
            Self::Deveo => deveo::PROVIDER_ID,
            Self::Assembla => assembla::PROVIDER_ID,
            Self::Slack => slack::PROVIDER_ID,
            Self::Passthrough => passthrough::PROVIDER_ID,
        }
    }

    /// Look a provider up by its route service id
    pub fn from_service_id(service_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == service_id)
    }

    /// Header carrying the event identifier, for providers that have one
    pub fn event_header(&self) -> Option<&'static str> {
        match self {
            Self::GitHub => Some(github::EVENT_HEADER),
            Self::GitLab => Some(gitlab::EVENT_HEADER),
            Self::BitbucketCloud => Some(bitbucket_cloud::EVENT_HEADER),
            Self::BitbucketServer => Some(bitbucket_server::EVENT_HEADER),
            Self::Gogs => Some(gogs::EVENT_HEADER),
            Self::Deveo => Some(deveo::EVENT_HEADER),
            Self::VisualStudio | Self::Assembla | Self::Slack | Self::Passthrough => None,
        }
    }

    /// True when the provider attempts to transform this event identifier.
    ///
    /// Providers without an event header accept everything here and decide
    /// from the payload instead.
    pub fn supports_event(&self, event: &str) -> bool {
        match self {
            Self::GitHub => github::SUPPORTED_EVENTS.contains(&event),
            Self::GitLab => gitlab::SUPPORTED_EVENTS.contains(&event),
            Self::BitbucketCloud => bitbucket_cloud::SUPPORTED_EVENTS.contains(&event),
            Self::BitbucketServer => bitbucket_server::SUPPORTED_EVENTS.contains(&event),
            Self::Gogs => gogs::SUPPORTED_EVENTS.contains(&event),
            Self::Deveo => deveo::SUPPORTED_EVENTS.contains(&event),
            Self::VisualStudio | Self::Assembla | Self::Slack | Self::Passthrough => true,
        }
    }

    /// Slack shows the response body to a human, so it gets a chat rendering
    pub fn renders_chat_response(&self) -> bool {
        matches!(self, Self::Slack)
    }

    /// Transform a raw request into build triggers.
    ///
    /// Pure and deterministic: the same request always yields a structurally
    /// identical result.
    #[instrument(skip(self, request), fields(provider = %self))]
    pub fn transform(&self, request: &WebhookRequest) -> TransformResult {
        let result = match self {
            Self::GitHub => github::transform(request),
            Self::GitLab => gitlab::transform(request),
            Self::BitbucketCloud => bitbucket_cloud::transform(request),
            Self::BitbucketServer => bitbucket_server::transform(request),
            Self::VisualStudio => visual_studio::transform(request),
            Self::Gogs => gogs::transform(request),
            Self::Deveo => deveo::transform(request),
            Self::Assembla => assembla::transform(request),
            Self::Slack => slack::transform(request),
            Self::Passthrough => passthrough::transform(request),
        };

        match &result {
            Ok(TransformResult::Triggers { entries, .. }) => {
                debug!(entry_count = entries.len(), "Webhook transformed into triggers");
            }
            Ok(TransformResult::Skip { reason }) => {
                debug!(reason = %reason, "Webhook skipped");
            }
            Ok(TransformResult::Error(error)) | Err(error) => {
                warn!(
                    error = %error,
                    category = error.category().as_str(),
                    "Webhook transform failed"
                );
            }
        }

        result.into()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = UnknownProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_service_id(s).ok_or_else(|| UnknownProviderError(s.to_string()))
    }
}

/// The service id does not name a known provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown webhook provider: {0}")]
pub struct UnknownProviderError(pub String);

// ============================================================================
// Shared helpers
// ============================================================================

/// A git ref split into its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GitRef<'a> {
    Branch(&'a str),
    Tag(&'a str),
    Other,
}

impl<'a> GitRef<'a> {
    pub(crate) fn parse(git_ref: &'a str) -> Self {
        if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
            Self::Branch(branch)
        } else if let Some(tag) = git_ref.strip_prefix("refs/tags/") {
            Self::Tag(tag)
        } else {
            Self::Other
        }
    }
}

/// Decode a JSON body, or the JSON held in the `payload` form field.
pub(crate) fn decode_json_or_form_payload<T: DeserializeOwned>(
    request: &WebhookRequest,
    media_type: &str,
) -> Result<T, TransformError> {
    if media_type == FORM_CONTENT_TYPE {
        let fields = request.form_fields()?;
        let payload = fields.get("payload").ok_or_else(|| TransformError::Decode {
            message: "form body has no 'payload' field".to_string(),
        })?;
        decode_json_bytes(payload.as_bytes())
    } else {
        request.decode_json()
    }
}

/// Treat an empty string as absent
pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// All-zero object id used by git for created/deleted refs
pub(crate) fn is_zero_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|b| b == b'0')
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
