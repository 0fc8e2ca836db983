//! GitLab webhooks: push, tag push and merge request hooks.

use super::{non_empty, GitRef, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, CommitPaths, EnvironmentItem, TriggerEntry},
    ready_state::{resolve_ready_state, ReadyTransition},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const PROVIDER_ID: &str = "gitlab";
pub const EVENT_HEADER: &str = "X-Gitlab-Event";
pub const SUPPORTED_EVENTS: &[&str] = &[PUSH_HOOK, TAG_PUSH_HOOK, MERGE_REQUEST_HOOK];

const PUSH_HOOK: &str = "Push Hook";
const TAG_PUSH_HOOK: &str = "Tag Push Hook";
const MERGE_REQUEST_HOOK: &str = "Merge Request Hook";

/// Environment item carrying every commit message of a push
pub const COMMIT_MESSAGES_ENV_KEY: &str = "GITLAB_COMMIT_MESSAGES";

/// Upper bound in bytes for the joined commit messages value
pub const COMMIT_MESSAGES_BUDGET: usize = 10 * 1024;

const BUILDABLE_MR_STATES: &[&str] = &["opened", "reopened"];
const BUILDABLE_MR_ACTIONS: &[&str] = &["", "open", "reopen", "update"];
const PRIVATE_VISIBILITY_LEVEL: u32 = 0;

// ============================================================================
// Payload models
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub checkout_sha: Option<String>,
    #[serde(default)]
    pub user_username: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
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
pub(crate) struct Repository {
    #[serde(default)]
    pub git_http_url: String,
    #[serde(default)]
    pub git_ssh_url: String,
    pub visibility_level: Option<u32>,
}

impl Repository {
    fn url(&self) -> Option<String> {
        if self.visibility_level == Some(PRIVATE_VISIBILITY_LEVEL) {
            non_empty(&self.git_ssh_url)
        } else {
            non_empty(&self.git_http_url)
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequestEvent {
    pub user: Option<User>,
    pub object_attributes: MergeRequest,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub changes: MergeRequestChanges,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequest {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub action: String,
    pub oldrev: Option<String>,
    #[serde(default)]
    pub merge_status: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
    pub last_commit: Option<LastCommit>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub work_in_progress: bool,
    pub source: Option<Repository>,
    pub target: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastCommit {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Label {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MergeRequestChanges {
    pub labels: Option<Change<Vec<Label>>>,
    pub draft: Option<Change<bool>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Change<T> {
    pub previous: Option<T>,
    pub current: Option<T>,
}

// ============================================================================
// Transform
// ============================================================================

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    request.require_media_type(&[JSON_CONTENT_TYPE])?;

    match event {
        PUSH_HOOK => transform_push(&request.decode_json()?),
        TAG_PUSH_HOOK => transform_tag_push(&request.decode_json()?),
        MERGE_REQUEST_HOOK => transform_merge_request(&request.decode_json()?),
        other => Err(TransformError::unsupported(format!(
            "Unsupported GitLab webhook event: {other}"
        ))),
    }
}

fn checkout_sha(push: &PushEvent) -> Option<&str> {
    push.checkout_sha.as_deref().filter(|sha| !sha.is_empty())
}

fn transform_push(push: &PushEvent) -> Result<TransformResult, TransformError> {
    let GitRef::Branch(branch) = GitRef::parse(&push.git_ref) else {
        return Ok(TransformResult::skip(format!(
            "Ref ({}) is not a head ref",
            push.git_ref
        )));
    };

    let Some(checkout_sha) = checkout_sha(push) else {
        return Ok(TransformResult::skip(
            "Branch deleted (empty checkout_sha), no build can be started",
        ));
    };

    let head_commit = push
        .commits
        .iter()
        .find(|c| c.id == checkout_sha)
        .ok_or_else(|| {
            TransformError::validation(format!(
                "The commit specified by 'checkout_sha' ({checkout_sha}) was not included in the 'commits' array - no match found"
            ))
        })?;

    let messages: Vec<String> = push.commits.iter().map(|c| c.message.clone()).collect();

    let params = CanonicalBuildParams {
        branch: Some(branch.to_string()),
        commit_hash: Some(head_commit.id.clone()),
        commit_message: Some(head_commit.message.clone()),
        push_commit_paths: push
            .commits
            .iter()
            .map(|c| CommitPaths::new(c.added.clone(), c.removed.clone(), c.modified.clone()))
            .collect(),
        base_repository_url: push.repository.as_ref().and_then(Repository::url),
        environments: vec![EnvironmentItem::new(
            COMMIT_MESSAGES_ENV_KEY,
            join_commit_messages(&messages, COMMIT_MESSAGES_BUDGET),
        )],
        commit_messages: messages,
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, Some(push.user_username.as_str())),
    )]))
}

fn transform_tag_push(push: &PushEvent) -> Result<TransformResult, TransformError> {
    let GitRef::Tag(tag) = GitRef::parse(&push.git_ref) else {
        return Ok(TransformResult::skip(format!(
            "Ref ({}) is not a tag ref",
            push.git_ref
        )));
    };

    let Some(checkout_sha) = checkout_sha(push) else {
        return Ok(TransformResult::skip(
            "Tag deleted (empty checkout_sha), no build can be started",
        ));
    };

    let commit_message = push
        .commits
        .iter()
        .find(|c| c.id == checkout_sha)
        .map(|c| c.message.clone());

    let params = CanonicalBuildParams {
        tag: Some(tag.to_string()),
        commit_hash: Some(checkout_sha.to_string()),
        commit_message,
        base_repository_url: push.repository.as_ref().and_then(Repository::url),
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, Some(push.user_username.as_str())),
    )]))
}

fn transform_merge_request(event: &MergeRequestEvent) -> Result<TransformResult, TransformError> {
    let mr = &event.object_attributes;

    if !BUILDABLE_MR_STATES.contains(&mr.state.as_str()) {
        return Ok(TransformResult::skip(format!(
            "Merge Request state doesn't require a build: {}",
            mr.state
        )));
    }
    if !BUILDABLE_MR_ACTIONS.contains(&mr.action.as_str()) {
        return Ok(TransformResult::skip(format!(
            "Merge Request action doesn't require a build: {}",
            mr.action
        )));
    }

    let commit_hash = mr
        .last_commit
        .as_ref()
        .and_then(|c| non_empty(&c.id))
        .ok_or_else(|| TransformError::validation("Missing last commit hash"))?;

    let is_draft = mr.draft || mr.work_in_progress;
    let previous_draft = event.changes.draft.as_ref().and_then(|c| c.previous);
    let draft_changed = event
        .changes
        .draft
        .as_ref()
        .is_some_and(|c| c.previous.is_some() && c.previous != c.current);
    let labels_changed = event.changes.labels.is_some();
    let has_new_code = mr.oldrev.as_deref().is_some_and(|rev| !rev.is_empty());

    if mr.action == "update" && !has_new_code && !labels_changed && !draft_changed {
        return Ok(TransformResult::skip(
            "Merge Request update doesn't require a build: no code, label or draft change",
        ));
    }

    let current_labels: Vec<String> = event.labels.iter().map(|l| l.title.clone()).collect();
    let new_labels = event
        .changes
        .labels
        .as_ref()
        .map(added_labels)
        .unwrap_or_default();

    let commit_message = match mr.description.as_deref().filter(|d| !d.is_empty()) {
        Some(description) => format!("{}\n\n{}", mr.title, description),
        None => mr.title.clone(),
    };

    let base_url = mr.target.as_ref().and_then(Repository::url);
    let head_url = mr.source.as_ref().and_then(Repository::url);
    let fork_url = head_url.clone().filter(|url| Some(url) != base_url.as_ref());

    let merge_ref = format!("merge-requests/{}/merge", mr.iid);
    let author = event.user.as_ref().map(|u| u.username.as_str());

    let params = CanonicalBuildParams {
        branch: non_empty(&mr.source_branch),
        branch_dest: non_empty(&mr.target_branch),
        commit_hash: Some(commit_hash),
        commit_message: Some(commit_message),
        pull_request_id: Some(mr.iid),
        pull_request_author: author.and_then(non_empty),
        base_repository_url: base_url,
        head_repository_url: head_url,
        pull_request_repository_url: fork_url,
        pull_request_merge_branch: (mr.merge_status == "can_be_merged").then(|| merge_ref.clone()),
        pull_request_unverified_merge_branch: Some(merge_ref),
        pull_request_head_branch: Some(format!("merge-requests/{}/head", mr.iid)),
        pull_request_ready_state: Some(resolve_ready_state(
            is_draft,
            ReadyTransition::from_draft_change(previous_draft, is_draft),
        )),
        pull_request_labels: current_labels,
        new_pull_request_labels: new_labels,
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, author),
    )]))
}

/// Labels present after the change that were not present before
fn added_labels(change: &Change<Vec<Label>>) -> Vec<String> {
    let previous: BTreeSet<&str> = change
        .previous
        .iter()
        .flatten()
        .map(|l| l.title.as_str())
        .collect();
    change
        .current
        .iter()
        .flatten()
        .filter(|l| !previous.contains(l.title.as_str()))
        .map(|l| l.title.clone())
        .collect()
}

/// Join commit messages with newlines, keeping the result within `budget` bytes.
///
/// The budget is shared evenly: each message is cut to its share on a UTF-8
/// character boundary.
pub fn join_commit_messages(messages: &[String], budget: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let separators = messages.len() - 1;
    let share = budget.saturating_sub(separators) / messages.len();

    messages
        .iter()
        .map(|m| truncate_on_char_boundary(m, share))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
#[path = "gitlab_tests.rs"]
mod tests;
