//! Visual Studio Team Services (Azure DevOps) service hooks.
//!
//! There is no event header; the event type travels in the payload.

use super::{is_zero_hash, non_empty, GitRef, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    ready_state::{resolve_ready_state, ReadyTransition},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "visualstudio";

const PUBLISHER_ID: &str = "tfs";
const GIT_PUSH: &str = "git.push";
const PR_CREATED: &str = "git.pullrequest.created";
const PR_UPDATED: &str = "git.pullrequest.updated";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope {
    #[serde(default)]
    pub publisher_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PushResource {
    #[serde(default)]
    pub ref_updates: Vec<RefUpdate>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub pushed_by: Option<Identity>,
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub new_object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Commit {
    #[serde(default)]
    pub commit_id: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Identity {
    #[serde(default)]
    pub unique_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Repository {
    #[serde(default)]
    pub remote_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PullRequestResource {
    pub pull_request_id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_ref_name: String,
    #[serde(default)]
    pub target_ref_name: String,
    #[serde(default)]
    pub merge_status: String,
    #[serde(default)]
    pub is_draft: bool,
    pub last_merge_source_commit: Option<Commit>,
    pub created_by: Option<Identity>,
    pub repository: Option<Repository>,
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.require_media_type(&[JSON_CONTENT_TYPE])?;
    let envelope: Envelope = request.decode_json()?;

    if envelope.publisher_id != PUBLISHER_ID {
        return Err(TransformError::validation(format!(
            "Not a Team Foundation Server notification (publisherId: {}), can't start a build",
            envelope.publisher_id
        )));
    }

    match envelope.event_type.as_str() {
        GIT_PUSH => transform_push(&decode_resource(envelope.resource)?),
        PR_CREATED | PR_UPDATED => transform_pull_request(&decode_resource(envelope.resource)?),
        other => Err(TransformError::unsupported(format!(
            "Unsupported Visual Studio event type: {other}"
        ))),
    }
}

fn decode_resource<T: serde::de::DeserializeOwned>(
    resource: serde_json::Value,
) -> Result<T, TransformError> {
    serde_json::from_value(resource).map_err(|e| TransformError::Decode {
        message: format!("invalid 'resource' object: {e}"),
    })
}

fn transform_push(push: &PushResource) -> Result<TransformResult, TransformError> {
    let [ref_update] = push.ref_updates.as_slice() else {
        return Err(TransformError::validation(format!(
            "Can't detect branch information (resource.refUpdates must contain exactly one item, found {})",
            push.ref_updates.len()
        )));
    };

    if is_zero_hash(&ref_update.new_object_id) {
        return Ok(TransformResult::skip(
            "Ref was deleted (new object id is all zeros), no build can be started",
        ));
    }
    if ref_update.new_object_id.is_empty() {
        return Err(TransformError::validation("Missing commit hash"));
    }

    let commit_message = push
        .commits
        .iter()
        .find(|c| c.commit_id == ref_update.new_object_id)
        .map(|c| c.comment.clone());

    let mut params = CanonicalBuildParams {
        commit_hash: Some(ref_update.new_object_id.clone()),
        commit_message,
        base_repository_url: push
            .repository
            .as_ref()
            .and_then(|r| non_empty(&r.remote_url)),
        ..Default::default()
    };
    match GitRef::parse(&ref_update.name) {
        GitRef::Branch(branch) => params.branch = Some(branch.to_string()),
        GitRef::Tag(tag) => params.tag = Some(tag.to_string()),
        GitRef::Other => {
            return Ok(TransformResult::skip(format!(
                "Ref ({}) is not a head nor a tag ref",
                ref_update.name
            )));
        }
    }

    let actor = push.pushed_by.as_ref().map(|i| i.unique_name.as_str());
    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, actor),
    )]))
}

fn transform_pull_request(pr: &PullRequestResource) -> Result<TransformResult, TransformError> {
    if pr.status != "active" {
        return Ok(TransformResult::skip(format!(
            "Pull Request status doesn't require a build: {}",
            pr.status
        )));
    }

    let GitRef::Branch(source_branch) = GitRef::parse(&pr.source_ref_name) else {
        return Err(TransformError::validation(format!(
            "Invalid source branch: {}",
            pr.source_ref_name
        )));
    };
    let target_branch = match GitRef::parse(&pr.target_ref_name) {
        GitRef::Branch(branch) => non_empty(branch),
        _ => None,
    };
    let commit_hash = pr
        .last_merge_source_commit
        .as_ref()
        .and_then(|c| non_empty(&c.commit_id))
        .ok_or_else(|| TransformError::validation("Missing commit hash"))?;

    let commit_message = if pr.description.is_empty() {
        pr.title.clone()
    } else {
        format!("{}\n\n{}", pr.title, pr.description)
    };
    let merge_ref = format!("refs/pull/{}/merge", pr.pull_request_id);
    let author = pr.created_by.as_ref().map(|i| i.unique_name.as_str());

    let params = CanonicalBuildParams {
        branch: Some(source_branch.to_string()),
        branch_dest: target_branch,
        commit_hash: Some(commit_hash),
        commit_message: Some(commit_message),
        pull_request_id: Some(pr.pull_request_id),
        pull_request_author: author.and_then(non_empty),
        base_repository_url: pr.repository.as_ref().and_then(|r| non_empty(&r.remote_url)),
        pull_request_merge_branch: (pr.merge_status == "succeeded").then(|| merge_ref.clone()),
        pull_request_unverified_merge_branch: Some(merge_ref),
        pull_request_ready_state: Some(resolve_ready_state(pr.is_draft, ReadyTransition::None)),
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, author),
    )]))
}

#[cfg(test)]
#[path = "visual_studio_tests.rs"]
mod tests;
