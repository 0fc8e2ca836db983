//! Tests for the GitHub provider.

use super::*;
use crate::{build_params::PullRequestReadyState, webhook::RequestHeaders};
use serde_json::{json, Value};

fn request(event: &str, body: &Value) -> WebhookRequest {
    let headers: RequestHeaders = [
        ("Content-Type", "application/json"),
        ("X-Github-Event", event),
    ]
    .into_iter()
    .collect();
    WebhookRequest::new(headers, body.to_string())
}

fn push_body(git_ref: &str) -> Value {
    json!({
        "ref": git_ref,
        "deleted": false,
        "head_commit": {"id": "83b86e5f286f546dc5a4a58db66ceef44460c85e", "message": "re-structuring"},
        "commits": [
            {"id": "1111", "message": "first", "added": ["a.txt"], "removed": [], "modified": ["b.txt"]},
            {"id": "83b86e5f286f546dc5a4a58db66ceef44460c85e", "message": "re-structuring", "added": [], "removed": ["c.txt"], "modified": []}
        ],
        "pusher": {"name": "octocat"},
        "repository": {"private": false, "clone_url": "https://github.com/org/repo.git", "ssh_url": "git@github.com:org/repo.git"}
    })
}

fn pr_body(action: &str) -> Value {
    json!({
        "action": action,
        "pull_request": {
            "number": 12,
            "title": "Add feature",
            "body": "Details here",
            "merged": false,
            "mergeable": true,
            "draft": false,
            "user": {"login": "contributor"},
            "labels": [{"name": "bug"}, {"name": "ci"}],
            "head": {
                "ref": "feature",
                "sha": "83b86e5f286f546dc5a4a58db66ceef44460c85e",
                "repo": {"private": false, "clone_url": "https://github.com/fork/repo.git", "ssh_url": "git@github.com:fork/repo.git"}
            },
            "base": {
                "ref": "master",
                "sha": "0000",
                "repo": {"private": false, "clone_url": "https://github.com/org/repo.git", "ssh_url": "git@github.com:org/repo.git"}
            }
        }
    })
}

fn single_entry(result: &TransformResult) -> &CanonicalBuildParams {
    let entries = result.entries();
    assert_eq!(entries.len(), 1, "unexpected result: {result:?}");
    &entries[0].build_params
}

mod header_tests {
    use super::*;

    #[test]
    fn test_missing_content_type() {
        let headers: RequestHeaders = [("X-Github-Event", "push")].into_iter().collect();
        let result = transform(&WebhookRequest::new(headers, "{}"));
        assert_eq!(
            result,
            Err(TransformError::missing_header("Content-Type"))
        );
    }

    #[test]
    fn test_missing_event_header() {
        let headers: RequestHeaders = [("Content-Type", "application/json")].into_iter().collect();
        let result = transform(&WebhookRequest::new(headers, "{}"));
        assert_eq!(result, Err(TransformError::missing_header(EVENT_HEADER)));
    }

    #[test]
    fn test_unsupported_content_type() {
        let headers: RequestHeaders = [("Content-Type", "text/plain"), ("X-Github-Event", "push")]
            .into_iter()
            .collect();
        let result = transform(&WebhookRequest::new(headers, "{}"));
        assert!(matches!(result, Err(TransformError::ContentType { .. })));
    }

    #[test]
    fn test_ping_is_skipped() {
        let result = transform(&request("ping", &json!({"zen": "hi"}))).unwrap();
        assert_eq!(result.skip_reason(), Some("ping event received"));
    }

    #[test]
    fn test_unsupported_event() {
        let result = transform(&request("issues", &json!({})));
        assert!(matches!(result, Err(TransformError::UnsupportedEvent { .. })));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let headers: RequestHeaders = [
            ("Content-Type", "application/json"),
            ("X-Github-Event", "push"),
        ]
        .into_iter()
        .collect();
        let result = transform(&WebhookRequest::new(headers, "{not json"));
        assert!(matches!(result, Err(TransformError::Decode { .. })));
    }
}

mod push_tests {
    use super::*;

    #[test]
    fn test_branch_push() {
        let result = transform(&request("push", &push_body("refs/heads/master"))).unwrap();
        let params = single_entry(&result);

        assert_eq!(params.branch.as_deref(), Some("master"));
        assert_eq!(
            params.commit_hash.as_deref(),
            Some("83b86e5f286f546dc5a4a58db66ceef44460c85e")
        );
        assert_eq!(params.commit_message.as_deref(), Some("re-structuring"));
        assert_eq!(params.commit_messages, vec!["first", "re-structuring"]);
        assert_eq!(params.push_commit_paths.len(), 2);
        assert!(params.push_commit_paths[0].added.contains("a.txt"));
        assert!(params.push_commit_paths[1].removed.contains("c.txt"));
        assert_eq!(result.entries()[0].triggered_by, "webhook-github/octocat");
    }

    #[test]
    fn test_tag_push() {
        let result = transform(&request("push", &push_body("refs/tags/v1.0.0"))).unwrap();
        let params = single_entry(&result);

        assert_eq!(params.tag.as_deref(), Some("v1.0.0"));
        assert_eq!(params.branch, None);
        assert!(params.is_tag_push());
    }

    #[test]
    fn test_other_ref_is_skipped() {
        let result = transform(&request("push", &push_body("refs/notes/x"))).unwrap();
        assert_eq!(
            result.skip_reason(),
            Some("Ref (refs/notes/x) is not a head nor a tag ref")
        );
    }

    /// The ref decides before the head commit is looked at.
    #[test]
    fn test_other_ref_without_head_commit_is_skipped() {
        let mut body = push_body("refs/notes/x");
        body["head_commit"] = Value::Null;
        let result = transform(&request("push", &body)).unwrap();
        assert!(result.should_skip());
        assert!(result.entries().is_empty());
    }

    #[test]
    fn test_deleted_push_is_skipped() {
        let mut body = push_body("refs/heads/master");
        body["deleted"] = json!(true);
        let result = transform(&request("push", &body)).unwrap();
        assert!(result.should_skip());
    }

    #[test]
    fn test_missing_head_commit_is_validation_error() {
        let mut body = push_body("refs/heads/master");
        body["head_commit"] = Value::Null;
        let result = transform(&request("push", &body));
        assert_eq!(result, Err(TransformError::validation("Missing commit hash")));
    }

    /// Classic GitHub form deliveries wrap the JSON in a `payload` field.
    #[test]
    fn test_form_encoded_push() {
        let payload = push_body("refs/heads/develop").to_string();
        let body = format!("payload={}", urlencoding::encode(&payload));
        let headers: RequestHeaders = [
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("X-Github-Event", "push"),
        ]
        .into_iter()
        .collect();

        let result = transform(&WebhookRequest::new(headers, body)).unwrap();
        assert_eq!(single_entry(&result).branch.as_deref(), Some("develop"));
    }
}

mod pull_request_tests {
    use super::*;

    #[test]
    fn test_opened_pull_request() {
        let result = transform(&request("pull_request", &pr_body("opened"))).unwrap();
        let params = single_entry(&result);

        assert_eq!(params.pull_request_id, Some(12));
        assert_eq!(params.branch.as_deref(), Some("feature"));
        assert_eq!(params.branch_dest.as_deref(), Some("master"));
        assert_eq!(params.commit_message.as_deref(), Some("Add feature\n\nDetails here"));
        assert_eq!(params.pull_request_merge_branch.as_deref(), Some("pull/12/merge"));
        assert_eq!(
            params.pull_request_unverified_merge_branch.as_deref(),
            Some("pull/12/merge")
        );
        assert_eq!(params.pull_request_head_branch.as_deref(), Some("pull/12/head"));
        assert_eq!(
            params.pull_request_ready_state,
            Some(PullRequestReadyState::ReadyForReview)
        );
        assert_eq!(params.pull_request_author.as_deref(), Some("contributor"));
        assert_eq!(params.pull_request_labels, vec!["bug", "ci"]);
        assert_eq!(
            params.base_repository_url.as_deref(),
            Some("https://github.com/org/repo.git")
        );
        assert_eq!(
            params.pull_request_repository_url.as_deref(),
            Some("https://github.com/fork/repo.git")
        );
        assert_eq!(result.entries()[0].triggered_by, "webhook-github/contributor");
    }

    #[test]
    fn test_title_only_commit_message() {
        let mut body = pr_body("opened");
        body["pull_request"]["body"] = Value::Null;
        let result = transform(&request("pull_request", &body)).unwrap();
        assert_eq!(single_entry(&result).commit_message.as_deref(), Some("Add feature"));
    }

    /// Unknown mergeability still gets the unverified merge ref.
    #[test]
    fn test_merge_branch_requires_mergeable() {
        let mut body = pr_body("synchronize");
        body["pull_request"]["mergeable"] = Value::Null;
        let result = transform(&request("pull_request", &body)).unwrap();
        let params = single_entry(&result);
        assert_eq!(params.pull_request_merge_branch, None);
        assert_eq!(
            params.pull_request_unverified_merge_branch.as_deref(),
            Some("pull/12/merge")
        );
    }

    #[test]
    fn test_private_repository_uses_ssh_url() {
        let mut body = pr_body("opened");
        body["pull_request"]["base"]["repo"]["private"] = json!(true);
        body["pull_request"]["head"]["repo"] = body["pull_request"]["base"]["repo"].clone();
        let result = transform(&request("pull_request", &body)).unwrap();
        let params = single_entry(&result);
        assert_eq!(
            params.base_repository_url.as_deref(),
            Some("git@github.com:org/repo.git")
        );
        assert_eq!(params.pull_request_repository_url, None);
    }

    #[test]
    fn test_draft_and_ready_for_review_states() {
        let mut draft = pr_body("opened");
        draft["pull_request"]["draft"] = json!(true);
        let result = transform(&request("pull_request", &draft)).unwrap();
        assert_eq!(
            single_entry(&result).pull_request_ready_state,
            Some(PullRequestReadyState::Draft)
        );

        let result = transform(&request("pull_request", &pr_body("ready_for_review"))).unwrap();
        assert_eq!(
            single_entry(&result).pull_request_ready_state,
            Some(PullRequestReadyState::ConvertedToReadyForReview)
        );
    }

    #[test]
    fn test_unsupported_action_is_skipped() {
        let result = transform(&request("pull_request", &pr_body("closed"))).unwrap();
        assert!(result.should_skip());
    }

    #[test]
    fn test_merged_pull_request_is_skipped() {
        let mut body = pr_body("reopened");
        body["pull_request"]["merged"] = json!(true);
        let result = transform(&request("pull_request", &body)).unwrap();
        assert_eq!(result.skip_reason(), Some("Pull Request already merged"));
    }
}

mod edited_tests {
    use super::*;

    #[test]
    fn test_title_edit_without_previous_marker_is_skipped() {
        let mut body = pr_body("edited");
        body["changes"] = json!({"title": {"from": "Old title"}});
        let result = transform(&request("pull_request", &body)).unwrap();
        assert!(result.should_skip());
    }

    /// Removing a skip marker from the title must start the build it suppressed.
    #[test]
    fn test_title_edit_with_previous_marker_builds() {
        let mut body = pr_body("edited");
        body["changes"] = json!({"title": {"from": "Add feature [skip ci]"}});
        let result = transform(&request("pull_request", &body)).unwrap();
        assert_eq!(result.entries().len(), 1);
    }

    #[test]
    fn test_body_edit_without_previous_marker_is_skipped() {
        let mut body = pr_body("edited");
        body["changes"] = json!({"body": {"from": "Older details"}});
        let result = transform(&request("pull_request", &body)).unwrap();
        assert!(result.should_skip());
        assert!(result.entries().is_empty());
    }

    #[test]
    fn test_body_edit_with_previous_marker_builds() {
        let mut body = pr_body("edited");
        body["changes"] = json!({"body": {"from": "wip [ci skip]"}});
        let result = transform(&request("pull_request", &body)).unwrap();
        let params = single_entry(&result);

        assert!(!result.should_skip());
        assert_eq!(params.branch.as_deref(), Some("feature"));
        assert_eq!(params.branch_dest.as_deref(), Some("master"));
        assert_eq!(
            params.commit_hash.as_deref(),
            Some("83b86e5f286f546dc5a4a58db66ceef44460c85e")
        );
        assert_eq!(
            params.commit_message.as_deref(),
            Some("Add feature\n\nDetails here")
        );
        assert_eq!(
            params.pull_request_unverified_merge_branch.as_deref(),
            Some("pull/12/merge")
        );
        assert_eq!(params.pull_request_head_branch.as_deref(), Some("pull/12/head"));
    }

    #[test]
    fn test_base_change_builds() {
        let mut body = pr_body("edited");
        body["changes"] = json!({"base": {"ref": {"from": "develop"}}});
        let result = transform(&request("pull_request", &body)).unwrap();
        assert_eq!(result.entries().len(), 1);
    }
}
