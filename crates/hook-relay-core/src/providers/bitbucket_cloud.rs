//! Bitbucket Cloud (webhooks v2): `repo:push` and pull request events.

use super::{non_empty, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    ready_state::{resolve_ready_state, ReadyTransition},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;
use tracing::debug;

pub const PROVIDER_ID: &str = "bitbucket-v2";
pub const EVENT_HEADER: &str = "X-Event-Key";
pub const SUPPORTED_EVENTS: &[&str] = &[REPO_PUSH, PR_CREATED, PR_UPDATED];

const ATTEMPT_HEADER: &str = "X-Attempt-Number";
const REPO_PUSH: &str = "repo:push";
const PR_CREATED: &str = "pullrequest:created";
const PR_UPDATED: &str = "pullrequest:updated";

// ============================================================================
// Payload models
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct PushEvent {
    pub actor: Option<Actor>,
    pub repository: Option<Repository>,
    pub push: Push,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Push {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Change {
    pub new: Option<ChangeTarget>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangeTarget {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    pub target: Option<CommitTarget>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitTarget {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Actor {
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestEvent {
    pub actor: Option<Actor>,
    pub repository: Option<Repository>,
    pub pullrequest: PullRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub author: Option<Actor>,
    pub source: PullRequestEnd,
    pub destination: PullRequestEnd,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestEnd {
    pub branch: Option<NamedBranch>,
    pub commit: Option<CommitRef>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamedBranch {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitRef {
    #[serde(default)]
    pub hash: String,
}

/// Clone URL of a repository by full name; SSH for private repositories
fn repository_url(full_name: &str, is_private: bool) -> Option<String> {
    if full_name.is_empty() {
        None
    } else if is_private {
        Some(format!("git@bitbucket.org:{full_name}.git"))
    } else {
        Some(format!("https://bitbucket.org/{full_name}.git"))
    }
}

// ============================================================================
// Transform
// ============================================================================

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    request.require_media_type(&[JSON_CONTENT_TYPE])?;

    if let Some(attempt) = request.headers.get(ATTEMPT_HEADER) {
        debug!(attempt = %attempt, "Bitbucket delivery attempt");
    }

    match event {
        REPO_PUSH => transform_push(&request.decode_json()?),
        PR_CREATED | PR_UPDATED => Ok(transform_pull_request(&request.decode_json()?)),
        other => Err(TransformError::unsupported(format!(
            "Unsupported Bitbucket webhook event: {other}"
        ))),
    }
}

fn transform_push(event: &PushEvent) -> Result<TransformResult, TransformError> {
    let actor = event.actor.as_ref().map(|a| a.nickname.as_str());
    let base_url = event
        .repository
        .as_ref()
        .and_then(|r| repository_url(&r.full_name, r.is_private));

    let mut entries = Vec::new();
    for change in &event.push.changes {
        let Some(new) = &change.new else {
            continue;
        };
        let target = new
            .target
            .as_ref()
            .filter(|t| !t.hash.is_empty())
            .ok_or_else(|| TransformError::validation("Missing commit hash"))?;

        let mut params = CanonicalBuildParams {
            commit_hash: Some(target.hash.clone()),
            commit_message: Some(target.message.clone()),
            base_repository_url: base_url.clone(),
            ..Default::default()
        };
        match new.kind.as_str() {
            "branch" => params.branch = Some(new.name.clone()),
            "tag" => params.tag = Some(new.name.clone()),
            other => {
                return Err(TransformError::validation(format!(
                    "Unsupported change type: {other}"
                )));
            }
        }
        entries.push(TriggerEntry::new(params, triggered_by(PROVIDER_ID, actor)));
    }

    if entries.is_empty() {
        return Ok(TransformResult::skip(
            "'changes' array is empty or every change is a deletion",
        ));
    }
    Ok(TransformResult::triggers(entries))
}

fn transform_pull_request(event: &PullRequestEvent) -> TransformResult {
    let pr = &event.pullrequest;

    if pr.state != "OPEN" {
        return TransformResult::skip(format!(
            "Pull Request state doesn't require a build: {}",
            pr.state
        ));
    }

    let is_private = event.repository.as_ref().is_some_and(|r| r.is_private);
    let end_url = |end: &PullRequestEnd| {
        end.repository
            .as_ref()
            .and_then(|r| repository_url(&r.full_name, is_private))
    };
    let base_url = end_url(&pr.destination);
    let head_url = end_url(&pr.source);
    let fork_url = head_url.clone().filter(|url| Some(url) != base_url.as_ref());

    let commit_message = if pr.description.is_empty() {
        pr.title.clone()
    } else {
        format!("{}\n\n{}", pr.title, pr.description)
    };
    let author = pr
        .author
        .as_ref()
        .or(event.actor.as_ref())
        .map(|a| a.nickname.as_str());

    let params = CanonicalBuildParams {
        branch: pr.source.branch.as_ref().and_then(|b| non_empty(&b.name)),
        branch_dest: pr.destination.branch.as_ref().and_then(|b| non_empty(&b.name)),
        commit_hash: pr.source.commit.as_ref().and_then(|c| non_empty(&c.hash)),
        commit_message: Some(commit_message),
        pull_request_id: Some(pr.id),
        pull_request_author: author.and_then(non_empty),
        base_repository_url: base_url,
        head_repository_url: head_url,
        pull_request_repository_url: fork_url,
        pull_request_ready_state: Some(resolve_ready_state(pr.draft, ReadyTransition::None)),
        ..Default::default()
    };

    TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, author),
    )])
}

#[cfg(test)]
#[path = "bitbucket_cloud_tests.rs"]
mod tests;
