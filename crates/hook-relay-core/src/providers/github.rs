//! GitHub webhooks: `push` and `pull_request`, JSON or form encoded.

use super::{decode_json_or_form_payload, non_empty, GitRef, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, CommitPaths, TriggerEntry},
    ready_state::{resolve_ready_state, ReadyTransition},
    skip_ci::is_skip_build_by_commit_message,
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "github";
pub const EVENT_HEADER: &str = "X-Github-Event";
pub const SUPPORTED_EVENTS: &[&str] = &["ping", "push", "pull_request"];

const SUPPORTED_PR_ACTIONS: &[&str] = &[
    "opened",
    "reopened",
    "synchronize",
    "edited",
    "ready_for_review",
];

// ============================================================================
// Payload models
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub deleted: bool,
    pub head_commit: Option<Commit>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub pusher: Option<Pusher>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pusher {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestEvent {
    #[serde(default)]
    pub action: String,
    pub pull_request: PullRequest,
    #[serde(default)]
    pub changes: PullRequestChanges,
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub merged: bool,
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub draft: bool,
    pub head: BranchRef,
    pub base: BranchRef,
    pub user: Option<User>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchRef {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub sha: String,
    pub repo: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub ssh_url: String,
    #[serde(default)]
    pub clone_url: String,
}

impl Repository {
    /// SSH URL for private repositories, HTTPS clone URL otherwise
    fn url(&self) -> Option<String> {
        if self.private {
            non_empty(&self.ssh_url)
        } else {
            non_empty(&self.clone_url)
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Label {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PullRequestChanges {
    pub title: Option<ChangedFrom>,
    pub body: Option<ChangedFrom>,
    pub base: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangedFrom {
    #[serde(default)]
    pub from: String,
}

// ============================================================================
// Transform
// ============================================================================

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    let media_type = request.require_media_type(&[JSON_CONTENT_TYPE, FORM_CONTENT_TYPE])?;

    match event {
        "ping" => Ok(TransformResult::skip("ping event received")),
        "push" => {
            let push: PushEvent = decode_json_or_form_payload(request, &media_type)?;
            transform_push(&push)
        }
        "pull_request" => {
            let pull_request: PullRequestEvent =
                decode_json_or_form_payload(request, &media_type)?;
            Ok(transform_pull_request(&pull_request))
        }
        other => Err(TransformError::unsupported(format!(
            "Unsupported GitHub webhook event: {other}"
        ))),
    }
}

fn transform_push(push: &PushEvent) -> Result<TransformResult, TransformError> {
    if push.deleted {
        return Ok(TransformResult::skip(
            "This is a 'Deleted' event, no build can be started",
        ));
    }

    let (branch, tag) = match GitRef::parse(&push.git_ref) {
        GitRef::Branch(branch) => (Some(branch), None),
        GitRef::Tag(tag) => (None, Some(tag)),
        GitRef::Other => {
            return Ok(TransformResult::skip(format!(
                "Ref ({}) is not a head nor a tag ref",
                push.git_ref
            )));
        }
    };

    let head_commit = push
        .head_commit
        .as_ref()
        .filter(|c| !c.id.is_empty())
        .ok_or_else(|| TransformError::validation("Missing commit hash"))?;

    let by = triggered_by(PROVIDER_ID, push.pusher.as_ref().map(|p| p.name.as_str()));

    let mut params = CanonicalBuildParams {
        branch: branch.map(str::to_string),
        tag: tag.map(str::to_string),
        commit_hash: Some(head_commit.id.clone()),
        commit_message: Some(head_commit.message.clone()),
        base_repository_url: push.repository.as_ref().and_then(Repository::url),
        ..Default::default()
    };
    if branch.is_some() {
        params.commit_messages = push.commits.iter().map(|c| c.message.clone()).collect();
        params.push_commit_paths = push
            .commits
            .iter()
            .map(|c| CommitPaths::new(c.added.clone(), c.removed.clone(), c.modified.clone()))
            .collect();
    }

    Ok(TransformResult::triggers(vec![TriggerEntry::new(params, by)]))
}

fn transform_pull_request(event: &PullRequestEvent) -> TransformResult {
    let pr = &event.pull_request;

    if !SUPPORTED_PR_ACTIONS.contains(&event.action.as_str()) {
        return TransformResult::skip(format!(
            "Pull Request action doesn't require a build: {}",
            event.action
        ));
    }
    if pr.merged {
        return TransformResult::skip("Pull Request already merged");
    }
    if event.action == "edited" && event.changes.base.is_none() {
        let previously_skipped = event
            .changes
            .title
            .iter()
            .chain(event.changes.body.iter())
            .any(|change| is_skip_build_by_commit_message(&change.from));
        if !previously_skipped {
            return TransformResult::skip(
                "Pull Request edit doesn't require a build: only title and/or description was changed, and previous one was not skipped",
            );
        }
    }

    let commit_message = match pr.body.as_deref().filter(|b| !b.is_empty()) {
        Some(body) => format!("{}\n\n{}", pr.title, body),
        None => pr.title.clone(),
    };

    let base_url = pr
        .base
        .repo
        .as_ref()
        .or(event.repository.as_ref())
        .and_then(Repository::url);
    let head_url = pr.head.repo.as_ref().and_then(Repository::url);
    let fork_url = head_url.clone().filter(|url| Some(url) != base_url.as_ref());

    let merge_ref = format!("pull/{}/merge", pr.number);
    let author = pr.user.as_ref().map(|u| u.login.as_str());

    let params = CanonicalBuildParams {
        branch: non_empty(&pr.head.git_ref),
        branch_dest: non_empty(&pr.base.git_ref),
        commit_hash: non_empty(&pr.head.sha),
        commit_message: Some(commit_message),
        pull_request_id: Some(pr.number),
        pull_request_author: author.and_then(non_empty),
        base_repository_url: base_url,
        head_repository_url: head_url,
        pull_request_repository_url: fork_url,
        pull_request_merge_branch: (pr.mergeable == Some(true)).then(|| merge_ref.clone()),
        pull_request_unverified_merge_branch: Some(merge_ref),
        pull_request_head_branch: Some(format!("pull/{}/head", pr.number)),
        pull_request_ready_state: Some(resolve_ready_state(
            pr.draft,
            ReadyTransition::from_action(&event.action),
        )),
        pull_request_labels: pr.labels.iter().map(|l| l.name.clone()).collect(),
        ..Default::default()
    };

    TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, author),
    )])
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
