//! Canonical build trigger types.
//!
//! Every provider converts its payload into one or more [`TriggerEntry`]
//! values. The [`CanonicalBuildParams`] inside an entry is the platform
//! agnostic description of the build to start: a branch push, a tag push, or a
//! pull request. A single entry never mixes a tag with pull request fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalized parameters of a single build trigger.
///
/// All fields are optional; empty collections and `None` values are omitted
/// from the serialised form so the downstream endpoint only sees what the
/// provider actually knew.
///
/// # Examples
///
/// ```rust
/// use hook_relay_core::CanonicalBuildParams;
///
/// let params = CanonicalBuildParams {
///     branch: Some("master".to_string()),
///     commit_hash: Some("abc123".to_string()),
///     ..Default::default()
/// };
/// assert!(params.is_branch_push());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBuildParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_dest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    /// Every commit message of a push, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_messages: Vec<String>,

    /// Changed paths per commit, aligned with `commit_messages`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub push_commit_paths: Vec<CommitPaths>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_repository_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_repository_url: Option<String>,

    /// Repository the pull request originates from, when it is a fork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_repository_url: Option<String>,

    /// Merge ref, only set once the platform verified the PR is mergeable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_merge_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_unverified_merge_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_head_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_ready_state: Option<PullRequestReadyState>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pull_request_labels: Vec<String>,

    /// Labels added by the edit that produced this trigger.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_pull_request_labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentItem>,
}

impl CanonicalBuildParams {
    /// True when the entry describes a pull request build
    pub fn is_pull_request(&self) -> bool {
        self.pull_request_id.is_some()
    }

    /// True when the entry describes a tag push
    pub fn is_tag_push(&self) -> bool {
        self.tag.is_some() && !self.is_pull_request()
    }

    /// True when the entry describes a plain branch push
    pub fn is_branch_push(&self) -> bool {
        self.branch.is_some() && self.tag.is_none() && !self.is_pull_request()
    }
}

/// Files touched by a single commit of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPaths {
    #[serde(default)]
    pub added: BTreeSet<String>,
    #[serde(default)]
    pub removed: BTreeSet<String>,
    #[serde(default)]
    pub modified: BTreeSet<String>,
}

impl CommitPaths {
    /// Build from any three path collections
    pub fn new<A, R, M>(added: A, removed: R, modified: M) -> Self
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
        M: IntoIterator<Item = String>,
    {
        Self {
            added: added.into_iter().collect(),
            removed: removed.into_iter().collect(),
            modified: modified.into_iter().collect(),
        }
    }
}

/// An environment variable handed to the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentItem {
    #[serde(rename = "mapped_to")]
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub is_expand: bool,
}

impl EnvironmentItem {
    /// Create a non-expanded environment item
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_expand: false,
        }
    }
}

/// Draft / ready classification of a pull or merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestReadyState {
    Draft,
    ReadyForReview,
    ConvertedToReadyForReview,
}

impl PullRequestReadyState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ReadyForReview => "ready_for_review",
            Self::ConvertedToReadyForReview => "converted_to_ready_for_review",
        }
    }
}

/// A canonical build trigger produced from one webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub build_params: CanonicalBuildParams,
    pub triggered_by: String,
    #[serde(default)]
    pub dont_wait_for_response: bool,
}

impl TriggerEntry {
    /// Create an entry that waits for the downstream response
    pub fn new(build_params: CanonicalBuildParams, triggered_by: impl Into<String>) -> Self {
        Self {
            build_params,
            triggered_by: triggered_by.into(),
            dont_wait_for_response: false,
        }
    }
}

/// Compose the `triggered_by` attribution for a provider and optional actor.
///
/// ```rust
/// use hook_relay_core::build_params::triggered_by;
///
/// assert_eq!(triggered_by("github", Some("octocat")), "webhook-github/octocat");
/// assert_eq!(triggered_by("gitlab", None), "webhook-gitlab");
/// ```
pub fn triggered_by(provider_id: &str, actor: Option<&str>) -> String {
    match actor.filter(|a| !a.is_empty()) {
        Some(actor) => format!("webhook-{provider_id}/{actor}"),
        None => format!("webhook-{provider_id}"),
    }
}

#[cfg(test)]
#[path = "build_params_tests.rs"]
mod tests;
