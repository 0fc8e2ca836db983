//! Gogs push webhooks.

use super::{is_zero_hash, non_empty, GitRef, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "gogs";
pub const EVENT_HEADER: &str = "X-Gogs-Event";
pub const SUPPORTED_EVENTS: &[&str] = &["push"];

#[derive(Debug, Deserialize)]
pub(crate) struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub pusher: Option<User>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub ssh_url: String,
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    request.require_media_type(&[JSON_CONTENT_TYPE])?;

    if event != "push" {
        return Err(TransformError::unsupported(format!(
            "Unsupported Gogs webhook event: {event}"
        )));
    }
    transform_push(&request.decode_json()?)
}

fn transform_push(push: &PushEvent) -> Result<TransformResult, TransformError> {
    if push.after.is_empty() || is_zero_hash(&push.after) {
        return Ok(TransformResult::skip(
            "Branch deleted ('after' is all zeros), no build can be started",
        ));
    }

    let GitRef::Branch(branch) = GitRef::parse(&push.git_ref) else {
        return Ok(TransformResult::skip(format!(
            "Ref ({}) is not a head ref",
            push.git_ref
        )));
    };

    let head_commit = push
        .commits
        .iter()
        .find(|c| c.id == push.after)
        .ok_or_else(|| {
            TransformError::validation(format!(
                "The commit specified by 'after' ({}) was not included in the 'commits' array - no match found",
                push.after
            ))
        })?;

    let params = CanonicalBuildParams {
        branch: Some(branch.to_string()),
        commit_hash: Some(head_commit.id.clone()),
        commit_message: Some(head_commit.message.clone()),
        commit_messages: push.commits.iter().map(|c| c.message.clone()).collect(),
        base_repository_url: push.repository.as_ref().and_then(|r| {
            if r.private {
                non_empty(&r.ssh_url)
            } else {
                non_empty(&r.clone_url)
            }
        }),
        ..Default::default()
    };

    let actor = push.pusher.as_ref().map(|p| p.username.as_str());
    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, actor),
    )]))
}

#[cfg(test)]
#[path = "gogs_tests.rs"]
mod tests;
