//! Bitbucket Server (self-hosted) webhooks.

use super::{non_empty, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    ready_state::{resolve_ready_state, ReadyTransition},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "bitbucket-server";
pub const EVENT_HEADER: &str = "X-Event-Key";
pub const SUPPORTED_EVENTS: &[&str] = &[
    DIAGNOSTICS_PING,
    REFS_CHANGED,
    PR_OPENED,
    PR_MODIFIED,
    PR_FROM_REF_UPDATED,
];

const DIAGNOSTICS_PING: &str = "diagnostics:ping";
const REFS_CHANGED: &str = "repo:refs_changed";
const PR_OPENED: &str = "pr:opened";
const PR_MODIFIED: &str = "pr:modified";
const PR_FROM_REF_UPDATED: &str = "pr:from_ref_updated";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefsChangedEvent {
    pub actor: Option<Actor>,
    pub repository: Option<Repository>,
    #[serde(default)]
    pub changes: Vec<RefChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefChange {
    #[serde(rename = "ref")]
    pub git_ref: Option<Ref>,
    #[serde(default)]
    pub to_hash: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ref {
    #[serde(default)]
    pub display_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Actor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub links: RepositoryLinks,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RepositoryLinks {
    #[serde(default)]
    pub clone: Vec<CloneLink>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloneLink {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub name: String,
}

impl Repository {
    /// SSH clone link for non-public repositories, HTTP otherwise
    fn url(&self) -> Option<String> {
        let wanted = if self.public { "http" } else { "ssh" };
        self.links
            .clone
            .iter()
            .find(|link| link.name == wanted)
            .and_then(|link| non_empty(&link.href))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PullRequestEvent {
    pub actor: Option<Actor>,
    pub pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
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
    pub author: Option<Participant>,
    pub from_ref: PullRequestRef,
    pub to_ref: PullRequestRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Participant {
    pub user: Actor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PullRequestRef {
    #[serde(default)]
    pub display_id: String,
    #[serde(default)]
    pub latest_commit: String,
    pub repository: Option<Repository>,
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.headers.require("Content-Type")?;
    let event = request.headers.require(EVENT_HEADER)?;
    request.require_media_type(&[JSON_CONTENT_TYPE])?;

    match event {
        DIAGNOSTICS_PING => Ok(TransformResult::skip("diagnostics:ping event received")),
        REFS_CHANGED => transform_refs_changed(&request.decode_json()?),
        PR_OPENED | PR_MODIFIED | PR_FROM_REF_UPDATED => {
            Ok(transform_pull_request(&request.decode_json()?))
        }
        other => Err(TransformError::unsupported(format!(
            "Unsupported Bitbucket Server webhook event: {other}"
        ))),
    }
}

fn transform_refs_changed(event: &RefsChangedEvent) -> Result<TransformResult, TransformError> {
    let actor = event.actor.as_ref().map(|a| a.name.as_str());
    let base_url = event.repository.as_ref().and_then(Repository::url);

    let mut entries = Vec::new();
    for change in event.changes.iter().filter(|c| c.kind != "DELETE") {
        let git_ref = change
            .git_ref
            .as_ref()
            .ok_or_else(|| TransformError::validation("Missing ref of change"))?;
        if change.to_hash.is_empty() {
            return Err(TransformError::validation("Missing commit hash"));
        }

        let mut params = CanonicalBuildParams {
            commit_hash: Some(change.to_hash.clone()),
            base_repository_url: base_url.clone(),
            ..Default::default()
        };
        match git_ref.kind.as_str() {
            "BRANCH" => params.branch = Some(git_ref.display_id.clone()),
            "TAG" => params.tag = Some(git_ref.display_id.clone()),
            other => {
                return Err(TransformError::validation(format!(
                    "Unsupported ref type: {other}"
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
    let pr = &event.pull_request;

    if pr.state != "OPEN" {
        return TransformResult::skip(format!(
            "Pull Request state doesn't require a build: {}",
            pr.state
        ));
    }

    let base_url = pr.to_ref.repository.as_ref().and_then(Repository::url);
    let head_url = pr.from_ref.repository.as_ref().and_then(Repository::url);
    let fork_url = head_url.clone().filter(|url| Some(url) != base_url.as_ref());

    let commit_message = if pr.description.is_empty() {
        pr.title.clone()
    } else {
        format!("{}\n\n{}", pr.title, pr.description)
    };
    let author = pr
        .author
        .as_ref()
        .map(|p| &p.user)
        .or(event.actor.as_ref())
        .map(|a| a.name.as_str());

    let params = CanonicalBuildParams {
        branch: non_empty(&pr.from_ref.display_id),
        branch_dest: non_empty(&pr.to_ref.display_id),
        commit_hash: non_empty(&pr.from_ref.latest_commit),
        commit_message: Some(commit_message),
        pull_request_id: Some(pr.id),
        pull_request_author: author.and_then(non_empty),
        base_repository_url: base_url,
        head_repository_url: head_url,
        pull_request_repository_url: fork_url,
        pull_request_unverified_merge_branch: Some(format!("refs/pull-requests/{}/merge", pr.id)),
        pull_request_head_branch: Some(format!("refs/pull-requests/{}/from", pr.id)),
        pull_request_ready_state: Some(resolve_ready_state(pr.draft, ReadyTransition::None)),
        ..Default::default()
    };

    TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, author),
    )])
}

#[cfg(test)]
#[path = "bitbucket_server_tests.rs"]
mod tests;
