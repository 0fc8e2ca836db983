//! Deveo push webhooks.

use super::{GitRef, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "deveo";
pub const EVENT_HEADER: &str = "X-Deveo-Event";
pub const SUPPORTED_EVENTS: &[&str] = &["push"];

#[derive(Debug, Deserialize)]
pub(crate) struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub pusher: Option<Pusher>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pusher {
    #[serde(default)]
    pub name: String,
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    request.require_media_type(&[JSON_CONTENT_TYPE])?;

    if event != "push" {
        return Err(TransformError::unsupported(format!(
            "Unsupported Deveo webhook event: {event}"
        )));
    }
    transform_push(&request.decode_json()?)
}

fn transform_push(push: &PushEvent) -> Result<TransformResult, TransformError> {
    if push.deleted {
        return Ok(TransformResult::skip(
            "This is a 'Deleted' event, no build can be started",
        ));
    }

    let git_ref = GitRef::parse(&push.git_ref);
    if git_ref == GitRef::Other {
        return Ok(TransformResult::skip(format!(
            "Ref ({}) is not a head nor a tag ref",
            push.git_ref
        )));
    }

    let head_commit = push
        .commits
        .iter()
        .find(|c| !push.after.is_empty() && c.id == push.after)
        .ok_or_else(|| {
            TransformError::validation(format!(
                "The commit specified by 'after' ({}) was not included in the 'commits' array - no match found",
                push.after
            ))
        })?;

    let mut params = CanonicalBuildParams {
        commit_hash: Some(head_commit.id.clone()),
        commit_message: Some(head_commit.message.clone()),
        ..Default::default()
    };
    match git_ref {
        GitRef::Branch(branch) => {
            params.branch = Some(branch.to_string());
            params.commit_messages = push.commits.iter().map(|c| c.message.clone()).collect();
        }
        GitRef::Tag(tag) => params.tag = Some(tag.to_string()),
        GitRef::Other => {}
    }

    let actor = push.pusher.as_ref().map(|p| p.name.as_str());
    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, actor),
    )]))
}

#[cfg(test)]
#[path = "deveo_tests.rs"]
mod tests;
