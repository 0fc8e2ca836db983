//! Tests for the Deveo provider.

use super::*;
use crate::webhook::RequestHeaders;
use serde_json::{json, Value};

fn request(body: &Value) -> WebhookRequest {
    let headers: RequestHeaders = [
        ("Content-Type", "application/json"),
        ("X-Deveo-Event", "push"),
    ]
    .into_iter()
    .collect();
    WebhookRequest::new(headers, body.to_string())
}

fn push_body(git_ref: &str) -> Value {
    json!({
        "ref": git_ref,
        "after": "2e9fb2cf5ad7b5b3a2e1d7e5b8a7a0d8c1e4f3b2",
        "deleted": false,
        "commits": [
            {"id": "2e9fb2cf5ad7b5b3a2e1d7e5b8a7a0d8c1e4f3b2", "message": "Add build config"}
        ],
        "pusher": {"name": "deveo-user"}
    })
}

#[test]
fn test_branch_push() {
    let result = transform(&request(&push_body("refs/heads/master"))).unwrap();
    let entry = &result.entries()[0];
    assert_eq!(entry.build_params.branch.as_deref(), Some("master"));
    assert_eq!(entry.build_params.commit_message.as_deref(), Some("Add build config"));
    assert_eq!(entry.triggered_by, "webhook-deveo/deveo-user");
}

#[test]
fn test_tag_push() {
    let result = transform(&request(&push_body("refs/tags/1.0"))).unwrap();
    let params = &result.entries()[0].build_params;
    assert_eq!(params.tag.as_deref(), Some("1.0"));
    assert_eq!(params.branch, None);
}

#[test]
fn test_deleted_is_skipped() {
    let mut body = push_body("refs/heads/master");
    body["deleted"] = json!(true);
    assert!(transform(&request(&body)).unwrap().should_skip());
}

#[test]
fn test_after_commit_required() {
    let mut body = push_body("refs/heads/master");
    body["commits"] = json!([]);
    let result = transform(&request(&body));
    assert!(matches!(result, Err(TransformError::Validation { .. })));
}

/// An unrecognised ref skips even when no commit matches `after`.
#[test]
fn test_other_ref_is_skipped_before_commit_lookup() {
    let mut body = push_body("refs/notes/x");
    body["commits"] = json!([]);
    let result = transform(&request(&body)).unwrap();
    assert_eq!(
        result.skip_reason(),
        Some("Ref (refs/notes/x) is not a head nor a tag ref")
    );
    assert!(result.entries().is_empty());
}
