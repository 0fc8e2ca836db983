//! Slack outgoing webhooks and slash commands.
//!
//! The message text carries the build parameters as `key: value` pairs
//! separated by `|`, for example
//! `branch: master | workflow: primary | env[DEPLOY]: staging`.

use super::{non_empty, FORM_CONTENT_TYPE};
use crate::{
    build_params::{triggered_by, CanonicalBuildParams, EnvironmentItem, TriggerEntry},
    webhook::{TransformError, TransformResult, WebhookRequest},
};

pub const PROVIDER_ID: &str = "slack";

/// Parse the parameter text of a Slack message into build params.
///
/// # Errors
///
/// Returns [`TransformError::Validation`] for malformed pairs, unknown keys,
/// or text naming neither a branch, a tag nor a workflow.
pub fn parse_build_text(text: &str) -> Result<CanonicalBuildParams, TransformError> {
    let mut params = CanonicalBuildParams::default();

    for pair in text.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once(':').ok_or_else(|| {
            TransformError::validation(format!(
                "Invalid parameter '{pair}', expected the form 'key: value'"
            ))
        })?;
        let key = key.trim();
        let value = value.trim().to_string();

        match key {
            "branch" | "b" => params.branch = Some(value),
            "tag" => params.tag = Some(value),
            "commit" | "c" => params.commit_hash = Some(value),
            "message" | "m" => params.commit_message = Some(value),
            "workflow" | "w" => params.workflow_id = Some(value),
            _ => match key.strip_prefix("env[").and_then(|k| k.strip_suffix(']')) {
                Some(name) if !name.is_empty() => {
                    params.environments.push(EnvironmentItem::new(name, value));
                }
                _ => {
                    return Err(TransformError::validation(format!(
                        "Unknown parameter: {key}"
                    )));
                }
            },
        }
    }

    if params.branch.is_none() && params.tag.is_none() && params.workflow_id.is_none() {
        return Err(TransformError::validation(
            "Missing branch, tag or workflow parameter",
        ));
    }
    Ok(params)
}

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    request.require_media_type(&[FORM_CONTENT_TYPE])?;
    let fields = request.form_fields()?;

    let text = fields.get("text").map(String::as_str).unwrap_or_default();
    let trigger_word = fields.get("trigger_word").map(String::as_str).unwrap_or_default();
    let text = text
        .strip_prefix(trigger_word)
        .unwrap_or(text)
        .trim_start_matches(':')
        .trim();

    if text.is_empty() {
        return Err(TransformError::validation(
            "Empty message text, no build parameters found",
        ));
    }

    let params = parse_build_text(text)?;
    let user = fields.get("user_name").and_then(|u| non_empty(u));

    let mut entry = TriggerEntry::new(params, triggered_by(PROVIDER_ID, user.as_deref()));
    entry.dont_wait_for_response = true;

    Ok(TransformResult::Triggers {
        entries: vec![entry],
        dont_wait_for_trigger_response: true,
    })
}

#[cfg(test)]
#[path = "slack_tests.rs"]
mod tests;
