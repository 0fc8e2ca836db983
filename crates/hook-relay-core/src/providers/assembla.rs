//! Assembla commit notifications.

use super::{non_empty, JSON_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, TriggerEntry},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use serde::Deserialize;

pub const PROVIDER_ID: &str = "assembla";

#[derive(Debug, Deserialize)]
pub(crate) struct Notification {
    pub assembla: Envelope,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub git: GitPush,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub space: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub object: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Message {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GitPush {
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit_id: String,
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.require_media_type(&[JSON_CONTENT_TYPE])?;
    let notification: Notification = request.decode_json()?;
    transform_notification(&notification)
}

fn transform_notification(n: &Notification) -> Result<TransformResult, TransformError> {
    if n.assembla.object != "Changeset" || n.assembla.action != "committed" {
        return Ok(TransformResult::skip(format!(
            "Not a commit notification (object: {}, action: {}) in space '{}'",
            n.assembla.object, n.assembla.action, n.assembla.space
        )));
    }

    let branch =
        non_empty(&n.git.branch).ok_or_else(|| TransformError::validation("Missing branch"))?;
    let commit_id = non_empty(&n.git.commit_id)
        .ok_or_else(|| TransformError::validation("Missing commit id"))?;

    let commit_message = if n.message.body.is_empty() {
        n.message.title.clone()
    } else {
        n.message.body.clone()
    };

    let params = CanonicalBuildParams {
        branch: Some(branch),
        commit_hash: Some(commit_id),
        commit_message: non_empty(&commit_message),
        base_repository_url: non_empty(&n.git.repository_url),
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, Some(n.message.author.as_str())),
    )]))
}

#[cfg(test)]
#[path = "assembla_tests.rs"]
mod tests;
