use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use git_promotion::config::PathMapping;
use git_promotion::event::FieldMap;
use git_promotion::promotion::{
    PromoterOptions, Promoter, PromotionError, PromotionOutcome, PromotionRequest,
};
use git_promotion::replacer::ContentReplacer;
use git_promotion::repoaccess::{
    GitHubClient, GitHubConfig, RepoAccessError, RepositoryClient, RepositoryFile,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BRANCH: &str = "promote/qa_production-ctx1";
const VALUES: &str = "envs/production/values.yaml";

fn client(server: &MockServer) -> GitHubClient {
    let config = GitHubConfig::for_repository("o/r", server.uri(), Some("tok".to_string())).unwrap();
    GitHubClient::new(config).unwrap()
}

fn file_entry(path: &str, sha: &str, content: &str) -> serde_json::Value {
    json!({
        "type": "file",
        "path": path,
        "sha": sha,
        "encoding": "base64",
        "content": STANDARD.encode(content),
    })
}

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

async fn mount_new_branch(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/o/r/git/ref/heads/{BRANCH}")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/git/ref/heads/main"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ref": "refs/heads/main", "object": {"sha": "c0ffee"}})),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/git/refs"))
        .and(body_partial_json(
            json!({"ref": format!("refs/heads/{BRANCH}"), "sha": "c0ffee"}),
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
}

async fn promote(server: &MockServer, fields: &FieldMap) -> Result<PromotionOutcome, PromotionError> {
    let promoter = Promoter::new(
        Box::new(client(server)),
        ContentReplacer::default(),
        PromoterOptions::default(),
    );
    let paths = [PathMapping::in_place(VALUES)];
    promoter
        .promote(PromotionRequest {
            repository: "o/r",
            fields,
            source_branch: "main",
            target_branch: BRANCH,
            title: "keptn: Promote to stage production (ctx: ctx1)",
            body: "",
            paths: &paths,
        })
        .await
}

#[tokio::test]
async fn promotion_updates_marked_file_and_opens_pull_request() {
    let server = MockServer::start().await;
    mount_new_branch(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/o/r/contents/{VALUES}")))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_entry(
            VALUES,
            "sha-1",
            "image: app:1.0 # {\"keptn.git-promotion.replacewith\":\"data.image\"}\n",
        )))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/repos/o/r/contents/{VALUES}")))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "message": "(build) update file",
            "branch": BRANCH,
            "sha": "sha-1",
            "content": STANDARD.encode(
                "image: app:2.0 # {\"keptn.git-promotion.replacewith\":\"data.image\"}\n"
            ),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/pulls"))
        .and(body_partial_json(json!({"head": BRANCH, "base": "main"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 12,
            "html_url": "https://github.com/o/r/pull/12",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = promote(&server, &fields(&[("data.image", "app:2.0")]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PromotionOutcome::PullRequestOpened {
            number: 12,
            url: "https://github.com/o/r/pull/12".to_string(),
        }
    );
    assert_eq!(outcome.pull_request_url(), Some("https://github.com/o/r/pull/12"));
}

#[tokio::test]
async fn unchanged_file_deletes_fresh_branch() {
    let server = MockServer::start().await;
    mount_new_branch(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/o/r/contents/{VALUES}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_entry(
            VALUES,
            "sha-1",
            "replicas: 2\n",
        )))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/repos/o/r/git/refs/heads/{BRANCH}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/pulls"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = promote(&server, &fields(&[("data.image", "app:2.0")]))
        .await
        .unwrap();

    assert_eq!(outcome, PromotionOutcome::NoChangesDetected);
    assert_eq!(outcome.to_string(), "no changes detected");
}

#[tokio::test]
async fn existing_promotion_branch_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/o/r/git/ref/heads/{BRANCH}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ref": format!("refs/heads/{BRANCH}"), "object": {"sha": "1"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/o/r/git/refs"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = promote(&server, &FieldMap::new()).await.unwrap_err();

    assert!(matches!(err, PromotionError::Conflict(ref b) if b == BRANCH));
    assert_eq!(
        err.to_string(),
        format!("Branch with name {BRANCH} already exists")
    );
}

#[tokio::test]
async fn directory_listing_is_read_recursively_at_the_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/envs/qa"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "path": "envs/qa/a.yaml", "sha": "s-a"},
            {"type": "dir", "path": "envs/qa/sub", "sha": "s-sub"},
            {"type": "symlink", "path": "envs/qa/link", "sha": "s-l"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/envs/qa/a.yaml"))
        .and(query_param("ref", "main"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(file_entry("envs/qa/a.yaml", "s-a", "a: 1\n")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/envs/qa/sub"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            file_entry("envs/qa/sub/b.yaml", "s-b", "b: 1\n"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/envs/qa/sub/b.yaml"))
        .and(query_param("ref", "main"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_entry("envs/qa/sub/b.yaml", "s-b", "b: 1\n")),
        )
        .mount(&server)
        .await;

    let files = client(&server)
        .get_files_for_branch("main", "envs/qa")
        .await
        .unwrap();

    assert_eq!(
        files,
        vec![
            RepositoryFile::new("envs/qa/a.yaml", "a: 1\n", "s-a"),
            RepositoryFile::new("envs/qa/sub/b.yaml", "b: 1\n", "s-b"),
        ]
    );
}

#[tokio::test]
async fn missing_path_yields_no_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/envs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let files = client(&server)
        .get_files_for_branch("main", "envs/missing")
        .await
        .unwrap();

    assert!(files.is_empty());
}

#[tokio::test]
async fn rejected_precondition_is_a_stale_version() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/o/r/contents/a.yaml"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "conflict"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/o/r/contents/b.yaml"))
        .and(body_partial_json(json!({"message": "(build) delete file", "sha": "old"})))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let client = client(&server);
    let update = client
        .update_file(BRANCH, "a.yaml", "a: 2\n", "old")
        .await
        .unwrap_err();
    let delete = client.delete_file(BRANCH, "b.yaml", "old").await.unwrap_err();

    assert!(matches!(update, RepoAccessError::StaleVersion { ref path, .. } if path == "a.yaml"));
    assert!(matches!(delete, RepoAccessError::StaleVersion { ref path, .. } if path == "b.yaml"));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/o/r/contents/new.yaml"))
        .and(body_partial_json(json!({"message": "(build) create file"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_file(BRANCH, "new.yaml", "x: 1\n")
        .await
        .unwrap_err();

    match err {
        RepoAccessError::ApiRequestFailed { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn compare_reports_new_commits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/o/r/compare/main...{BRANCH}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"commits": [{"sha": "1"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/compare/main...main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"commits": []})))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.check_for_new_commits("main", BRANCH).await.unwrap());
    assert!(!client.check_for_new_commits("main", "main").await.unwrap());
}
