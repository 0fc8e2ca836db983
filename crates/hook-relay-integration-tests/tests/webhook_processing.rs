//! Integration tests for end-to-end webhook processing
//!
//! Each test posts a realistic provider payload to the router and checks
//! what reached the mock build trigger API.

mod common;

use axum::http::StatusCode;
use common::{app_for, post_webhook, received_paths, received_triggers, start_trigger_api};
use serde_json::{json, Value};
use std::time::Duration;

const JSON: (&str, &str) = ("Content-Type", "application/json");

fn github_push(message: &str) -> Value {
    json!({
        "ref": "refs/heads/master",
        "deleted": false,
        "head_commit": {"id": "83b86e5f286f546dc5a4a58db66ceef44460c85e", "message": message},
        "commits": [
            {"id": "83b86e5f286f546dc5a4a58db66ceef44460c85e", "message": message, "added": ["a.txt"], "removed": [], "modified": []}
        ],
        "pusher": {"name": "octocat"},
        "repository": {"private": false, "clone_url": "https://github.com/org/repo.git", "ssh_url": "git@github.com:org/repo.git"}
    })
}

mod github_tests {
    use super::*;

    #[tokio::test]
    async fn test_push_triggers_build() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/secret-token",
            &[JSON, ("X-Github-Event", "push")],
            github_push("re-structuring").to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success_responses"][0]["build_number"], 1);

        let triggers = received_triggers(&server).await;
        assert_eq!(triggers.len(), 1);
        assert_eq!(
            triggers[0]["hook_info"],
            json!({"type": "bitrise", "api_token": "secret-token"})
        );
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        assert_eq!(
            triggers[0]["build_params"]["commit_hash"],
            "83b86e5f286f546dc5a4a58db66ceef44460c85e"
        );
        assert_eq!(triggers[0]["build_params"]["commit_message"], "re-structuring");
        assert_eq!(triggers[0]["triggered_by"], "webhook-github/octocat");

        assert_eq!(
            received_paths(&server).await,
            vec!["/app/my-app/build/start.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pull_request_triggers_build() {
        let server = start_trigger_api().await;
        let payload = json!({
            "action": "opened",
            "pull_request": {
                "number": 12,
                "title": "Add feature",
                "body": "Details here",
                "merged": false,
                "mergeable": true,
                "draft": false,
                "user": {"login": "contributor"},
                "labels": [],
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
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "pull_request")],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        let params = &triggers[0]["build_params"];
        assert_eq!(params["pull_request_id"], 12);
        assert_eq!(params["branch"], "feature");
        assert_eq!(params["branch_dest"], "master");
        assert_eq!(params["pull_request_merge_branch"], "pull/12/merge");
        assert_eq!(params["pull_request_head_branch"], "pull/12/head");
        assert_eq!(triggers[0]["triggered_by"], "webhook-github/contributor");
    }

    #[tokio::test]
    async fn test_ping_is_skipped_without_trigger() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "ping")],
            json!({"zen": "Keep it logically awesome."}).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["skipped_responses"].is_array());
        assert!(received_triggers(&server).await.is_empty());
    }

    /// A skip marker in the commit message answers 200 and calls nothing.
    #[tokio::test]
    async fn test_skip_ci_commit_is_not_triggered() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "push")],
            github_push("docs only [skip ci]").to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skipped_responses"][0]["branch"], "master");
        assert!(received_triggers(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "push")],
            "{not json",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"][0].is_string());
        assert!(received_triggers(&server).await.is_empty());
    }
}

mod gitlab_tests {
    use super::*;

    #[tokio::test]
    async fn test_push_hook_triggers_build() {
        let server = start_trigger_api().await;
        let payload = json!({
            "object_kind": "push",
            "ref": "refs/heads/develop",
            "checkout_sha": "da1560886d4f094c3e6c9ef40349f7d38b5d27d7",
            "user_username": "jsmith",
            "commits": [
                {"id": "da1560886d4f094c3e6c9ef40349f7d38b5d27d7", "message": "fixed readme", "added": [], "removed": [], "modified": ["README.md"]}
            ],
            "repository": {
                "git_http_url": "https://gitlab.example.com/mike/diaspora.git",
                "git_ssh_url": "git@gitlab.example.com:mike/diaspora.git",
                "visibility_level": 20
            }
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/gitlab/my-app/token",
            &[JSON, ("X-Gitlab-Event", "Push Hook")],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["branch"], "develop");
        assert_eq!(triggers[0]["build_params"]["commit_message"], "fixed readme");
        assert_eq!(triggers[0]["triggered_by"], "webhook-gitlab/jsmith");
    }

    #[tokio::test]
    async fn test_unsupported_event_is_bad_request() {
        let server = start_trigger_api().await;

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/gitlab/my-app/token",
            &[JSON, ("X-Gitlab-Event", "Pipeline Hook")],
            "{}",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(received_triggers(&server).await.is_empty());
    }
}

mod bitbucket_tests {
    use super::*;

    /// Every pushed ref becomes its own trigger call, in payload order.
    #[tokio::test]
    async fn test_cloud_push_with_two_changes() {
        let server = start_trigger_api().await;
        let payload = json!({
            "actor": {"nickname": "bbuser"},
            "repository": {"full_name": "team/repo", "is_private": true},
            "push": {"changes": [
                {"new": {"type": "branch", "name": "master", "target": {"hash": "aaa", "message": "commit on master"}}},
                {"new": {"type": "tag", "name": "v1.0", "target": {"hash": "bbb", "message": "commit on v1.0"}}}
            ]}
        });

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/bitbucket-v2/my-app/token",
            &[
                JSON,
                ("X-Event-Key", "repo:push"),
                ("User-Agent", "Bitbucket-Webhooks/2.0"),
            ],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success_responses"].as_array().map(Vec::len), Some(2));

        let triggers = received_triggers(&server).await;
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        assert_eq!(triggers[1]["build_params"]["tag"], "v1.0");
        assert_eq!(triggers[0]["triggered_by"], "webhook-bitbucket-v2/bbuser");
    }

    #[tokio::test]
    async fn test_server_refs_changed() {
        let server = start_trigger_api().await;
        let payload = json!({
            "eventKey": "repo:refs_changed",
            "actor": {"name": "admin"},
            "repository": {
                "public": false,
                "links": {"clone": [
                    {"href": "ssh://git@bitbucket.example.com:7999/prj/repo.git", "name": "ssh"},
                    {"href": "https://bitbucket.example.com/scm/prj/repo.git", "name": "http"}
                ]}
            },
            "changes": [
                {"ref": {"displayId": "master", "type": "BRANCH"}, "toHash": "aaa", "type": "UPDATE"}
            ]
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/bitbucket-server/my-app/token",
            &[
                ("Content-Type", "application/json; charset=utf-8"),
                ("X-Event-Key", "repo:refs_changed"),
            ],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        assert_eq!(triggers[0]["build_params"]["commit_hash"], "aaa");
        assert_eq!(triggers[0]["triggered_by"], "webhook-bitbucket-server/admin");
    }
}

mod other_provider_tests {
    use super::*;

    #[tokio::test]
    async fn test_visual_studio_push() {
        let server = start_trigger_api().await;
        let payload = json!({
            "publisherId": "tfs",
            "eventType": "git.push",
            "resource": {
                "refUpdates": [{
                    "name": "refs/heads/master",
                    "oldObjectId": "aad331d8d3b131fa9ae03cf5e53965b51942618a",
                    "newObjectId": "33b55f7cb7e7e245323987634f960cf4a6e6bc74"
                }],
                "commits": [{"commitId": "33b55f7cb7e7e245323987634f960cf4a6e6bc74", "comment": "Fixed bug in web.config file"}],
                "pushedBy": {"uniqueName": "fabrikamfiber4@hotmail.com"},
                "repository": {"remoteUrl": "https://fabrikam.visualstudio.com/DefaultCollection/_git/Fabrikam"}
            }
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/visualstudio/my-app/token",
            &[JSON],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        assert_eq!(
            triggers[0]["build_params"]["commit_hash"],
            "33b55f7cb7e7e245323987634f960cf4a6e6bc74"
        );
        assert_eq!(
            triggers[0]["triggered_by"],
            "webhook-visualstudio/fabrikamfiber4@hotmail.com"
        );
    }

    #[tokio::test]
    async fn test_gogs_push() {
        let server = start_trigger_api().await;
        let payload = json!({
            "ref": "refs/heads/master",
            "before": "28e1879d029cb852e4844d9c718537df08844e03",
            "after": "bffeb74224043ba2feb48d137756c8a9331c449a",
            "commits": [{"id": "bffeb74224043ba2feb48d137756c8a9331c449a", "message": "Release v1.0"}],
            "pusher": {"username": "unknwon"},
            "repository": {"private": false, "clone_url": "http://localhost:3000/unknwon/webhooks.git", "ssh_url": "ssh://unknwon@localhost:2222/unknwon/webhooks.git"}
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/gogs/my-app/token",
            &[JSON, ("X-Gogs-Event", "push")],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["commit_message"], "Release v1.0");
        assert_eq!(triggers[0]["triggered_by"], "webhook-gogs/unknwon");
    }

    #[tokio::test]
    async fn test_deveo_push() {
        let server = start_trigger_api().await;
        let payload = json!({
            "ref": "refs/heads/master",
            "after": "2e9fb2cf5ad7b5b3a2e1d7e5b8a7a0d8c1e4f3b2",
            "deleted": false,
            "commits": [{"id": "2e9fb2cf5ad7b5b3a2e1d7e5b8a7a0d8c1e4f3b2", "message": "Add build config"}],
            "pusher": {"name": "deveo-user"}
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/deveo/my-app/token",
            &[JSON, ("X-Deveo-Event", "push")],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        assert_eq!(triggers[0]["triggered_by"], "webhook-deveo/deveo-user");
    }

    #[tokio::test]
    async fn test_assembla_commit() {
        let server = start_trigger_api().await;
        let payload = json!({
            "assembla": {"space": "Bitrise", "action": "committed", "object": "Changeset"},
            "message": {"title": "1 commits [+0] [-0] [±1]", "body": "add readme", "author": "ci-user"},
            "git": {
                "repository_suffix": "origin",
                "repository_url": "git@git.assembla.com:bitrise.git",
                "branch": "master",
                "commit_id": "5d9f8aa5d5cb7a4d3b7c9c6b0e8f8cf1a8bb7a57"
            }
        });

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/assembla/my-app/token",
            &[JSON],
            payload.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["commit_message"], "add readme");
        assert_eq!(triggers[0]["triggered_by"], "webhook-assembla/ci-user");
    }

    #[tokio::test]
    async fn test_passthrough_forwards_body_as_environment() {
        let server = start_trigger_api().await;

        let (status, _) = post_webhook(
            app_for(&server),
            "/h/passthrough/my-app/token",
            &[("Content-Type", "text/plain")],
            "hello",
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let triggers = received_triggers(&server).await;
        assert_eq!(triggers[0]["build_params"]["branch"], "master");
        let environments = triggers[0]["build_params"]["environments"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert!(environments.iter().any(|item| item["value"] == "hello"));
        assert_eq!(triggers[0]["triggered_by"], "webhook-passthrough");
    }
}

mod slack_tests {
    use super::*;

    const FORM: (&str, &str) = ("Content-Type", "application/x-www-form-urlencoded");

    /// Slack is answered immediately; the trigger call completes afterwards.
    #[tokio::test]
    async fn test_outgoing_webhook_starts_build_in_background() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/slack/my-app/token",
            &[FORM],
            "user_name=jane&trigger_word=bitrise%3A&text=bitrise%3A+branch%3A+develop+%7C+workflow%3A+primary",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Starting 1 build(s)");

        let mut triggers = Vec::new();
        for _ in 0..100 {
            triggers = received_triggers(&server).await;
            if !triggers.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["build_params"]["branch"], "develop");
        assert_eq!(triggers[0]["build_params"]["workflow_id"], "primary");
        assert_eq!(triggers[0]["triggered_by"], "webhook-slack/jane");
    }

    #[tokio::test]
    async fn test_bad_parameters_are_reported_in_chat() {
        let server = start_trigger_api().await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/slack/my-app/token",
            &[FORM],
            "user_name=jane&text=colour%3A+red",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["text"].as_str().unwrap_or_default().contains("Error"));
        assert!(received_triggers(&server).await.is_empty());
    }
}

mod downstream_failure_tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A rejected trigger is reported as a failed response with status 400.
    #[tokio::test]
    async fn test_rejected_trigger_is_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "message": "workflow not found"
            })))
            .mount(&server)
            .await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "push")],
            github_push("re-structuring").to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["failed_responses"][0]["message"], "workflow not found");
    }

    #[tokio::test]
    async fn test_unreadable_trigger_response_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let (status, body) = post_webhook(
            app_for(&server),
            "/h/github/my-app/token",
            &[JSON, ("X-Github-Event", "push")],
            github_push("re-structuring").to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"][0]
            .as_str()
            .unwrap_or_default()
            .starts_with("Failed to trigger build"));
    }
}
