//! Generic passthrough: any request starts a build on `master` with the raw
//! body and headers available to the build as environment variables.

use crate::{
    build_params::{triggered_by, CanonicalBuildParams, EnvironmentItem, TriggerEntry},
    webhook::{TransformError, TransformResult, WebhookRequest},
};
use std::collections::BTreeMap;

pub const PROVIDER_ID: &str = "passthrough";

pub const BODY_ENV_KEY: &str = "WEBHOOK_PASSTHROUGH_BODY";
pub const HEADERS_ENV_KEY: &str = "WEBHOOK_PASSTHROUGH_HEADERS";

/// Largest body forwarded, in bytes
pub const MAX_BODY_SIZE: usize = 10 * 1024;

const DEFAULT_BRANCH: &str = "master";

pub(crate) fn transform(request: &WebhookRequest) -> Result<TransformResult, TransformError> {
    if request.body.len() > MAX_BODY_SIZE {
        return Err(TransformError::validation(format!(
            "Request body is too large ({} bytes), at most {MAX_BODY_SIZE} bytes are forwarded",
            request.body.len()
        )));
    }

    let headers: BTreeMap<&str, &str> = request.headers.iter().collect();
    let headers_json = serde_json::to_string(&headers).map_err(|e| TransformError::Decode {
        message: format!("failed to serialize headers: {e}"),
    })?;
    let body = String::from_utf8_lossy(&request.body).into_owned();

    let params = CanonicalBuildParams {
        branch: Some(DEFAULT_BRANCH.to_string()),
        environments: vec![
            EnvironmentItem::new(BODY_ENV_KEY, body),
            EnvironmentItem::new(HEADERS_ENV_KEY, headers_json),
        ],
        ..Default::default()
    };

    Ok(TransformResult::triggers(vec![TriggerEntry::new(
        params,
        triggered_by(PROVIDER_ID, None),
    )]))
}

#[cfg(test)]
#[path = "passthrough_tests.rs"]
mod tests;
