//! Contract tests for both transports against the in-memory platform.
//!
//! Any conforming transport must report unchanged prompts as
//! `PushOutcome::Unchanged`, link commits to their parent, and surface
//! unexpected statuses as `TransportError::Status`.

use std::sync::Arc;

use serde_json::json;
use tracekit_wire::fakes::MemoryPlatform;
use tracekit_wire::*;

fn stack() -> (Arc<MemoryPlatform>, PlatformApi) {
    let platform = Arc::new(MemoryPlatform::new());
    let api = PlatformApi::new(platform.clone());
    (platform, api)
}

fn transports(api: &PlatformApi) -> Vec<Box<dyn PlatformTransport>> {
    vec![
        Box::new(NativeClient::new(api.clone())),
        Box::new(DirectTransport::new(api.clone())),
    ]
}

fn manifest(template: &str) -> serde_json::Value {
    json!({ "template": template, "model": { "name": "gpt-4o-mini" } })
}

// ===========================================================================
// Prompt push
// ===========================================================================

#[tokio::test]
async fn identical_push_twice_is_created_then_unchanged() {
    let (_platform, api) = stack();
    for transport in transports(&api) {
        let repo = format!("triage-{}", transport.mode() == TransportMode::Native);
        let commit = PromptCommit::new("acme", &repo, manifest("Classify {email}"));

        let first = transport.push_prompt(&commit).await.unwrap();
        assert!(matches!(first, PushOutcome::Created { .. }), "{}", transport.mode());
        assert_eq!(
            first.url(),
            Some(format!("http://platform.test/repos/acme/{}", repo).as_str())
        );

        let second = transport.push_prompt(&commit).await.unwrap();
        assert_eq!(second, PushOutcome::Unchanged, "{}", transport.mode());
    }
}

#[tokio::test]
async fn second_version_links_to_parent() {
    let (platform, api) = stack();
    for transport in transports(&api) {
        let repo = format!("respond-{}", transport.mode() == TransportMode::Native);
        transport
            .push_prompt(&PromptCommit::new("acme", &repo, manifest("v1")))
            .await
            .unwrap();
        transport
            .push_prompt(&PromptCommit::new("acme", &repo, manifest("v2")))
            .await
            .unwrap();

        let commits = platform.commits("acme", &repo);
        assert_eq!(commits.len(), 2);
        assert_eq!(
            commits[1].parent_commit_hash.as_deref(),
            Some(commits[0].commit_hash.as_str())
        );
    }
}

#[tokio::test]
async fn direct_push_creates_missing_repo_and_retries_once() {
    let (platform, api) = stack();
    let direct = DirectTransport::new(api);

    let outcome = direct
        .push_prompt(&PromptCommit::new("acme", "triage", manifest("hello")))
        .await
        .unwrap();

    assert!(matches!(outcome, PushOutcome::Created { .. }));
    assert!(platform.has_repo("acme", "triage"));
    assert_eq!(platform.count_calls("POST", "/repos"), 1);
    assert_eq!(platform.count_calls("POST", "/commits/*/*"), 2);
}

#[tokio::test]
async fn direct_push_does_not_retry_twice() {
    let (platform, api) = stack();
    let direct = DirectTransport::new(api);
    // Both commit POSTs answer 404 even though the repo exists.
    platform.seed_commit("acme", "ghost", manifest("seed"));
    platform.fail_next("POST", "/commits/*/*", 404, 2);

    let err = direct
        .push_prompt(&PromptCommit::new("acme", "ghost", manifest("new")))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(platform.count_calls("POST", "/commits/*/*"), 2);
}

#[tokio::test]
async fn direct_push_survives_failed_parent_discovery() {
    let (platform, api) = stack();
    platform.seed_commit("acme", "triage", manifest("v1"));
    platform.fail_next("GET", "/commits/*/*/latest", 500, 1);

    let outcome = DirectTransport::new(api)
        .push_prompt(&PromptCommit::new("acme", "triage", manifest("v2")))
        .await
        .unwrap();

    assert!(matches!(outcome, PushOutcome::Created { .. }));
}

#[tokio::test]
async fn native_strict_push_raises_conflict() {
    let (_platform, api) = stack();
    let native = NativeClient::new(api);
    let commit = PromptCommit::new("acme", "triage", manifest("same"));

    native.push_prompt_strict(&commit).await.unwrap();
    let err = native.push_prompt_strict(&commit).await.unwrap_err();

    assert!(err.is_conflict());
}

#[tokio::test]
async fn unexpected_status_surfaces_as_error() {
    let (platform, api) = stack();
    platform.seed_commit("acme", "triage", manifest("v1"));
    platform.fail_next("POST", "/commits/*/*", 500, 2);

    for transport in transports(&api) {
        let err = transport
            .push_prompt(&PromptCommit::new("acme", "triage", manifest("v2")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500), "{}", transport.mode());
    }
}

// ===========================================================================
// Lookups
// ===========================================================================

#[tokio::test]
async fn lookups_return_none_when_absent() {
    let (_platform, api) = stack();

    assert!(api.get_repo("acme", "nope").await.unwrap().is_none());
    assert!(api.get_commit("acme", "nope", "latest").await.unwrap().is_none());
    assert!(api.list_commits("acme", "nope").await.unwrap().is_none());
    assert!(api.find_dataset("emails").await.unwrap().is_none());
    assert!(api.find_project("prod").await.unwrap().is_none());
    assert!(!api.delete_repo("acme", "nope").await.unwrap());
}

#[tokio::test]
async fn dataset_and_project_lookups_require_exact_name() {
    let (platform, api) = stack();
    let id = platform.seed_dataset("emails", vec![(json!({"email": "hi"}), None)]);
    platform.seed_project("prod");

    assert_eq!(api.find_dataset("emails").await.unwrap().unwrap().id, id);
    assert!(api.find_dataset("email").await.unwrap().is_none());
    assert!(api.find_project("prod").await.unwrap().is_some());
    assert_eq!(api.list_examples(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_repo_twice_reports_existing() {
    let (_platform, api) = stack();

    assert_eq!(api.create_repo("acme", "r").await.unwrap(), RepoCreation::Created);
    assert_eq!(
        api.create_repo("acme", "r").await.unwrap(),
        RepoCreation::AlreadyExists
    );
}

#[tokio::test]
async fn rule_listing_narrows_by_scope() {
    let (platform, api) = stack();
    let ds = platform.seed_dataset("emails", vec![]);
    let rule = EvaluatorRuleRequest {
        display_name: "triage_match".to_string(),
        target: RuleTarget::Dataset(ds.clone()),
        sampling_rate: 1.0,
        is_enabled: true,
        filter: None,
        body: EvaluatorBody::Code(vec![CodeSpec {
            code: "def perform_eval(run, example):\n    return {}".to_string(),
            language: "python".to_string(),
        }]),
    };
    api.create_evaluator(&rule).await.unwrap();

    let hit = api
        .list_rules(&RuleQuery::for_scope("triage", &RuleScope::Dataset(ds)))
        .await
        .unwrap();
    assert_eq!(hit.len(), 1);
    assert!(hit[0].has_body());

    let miss = api
        .list_rules(&RuleQuery::for_scope(
            "triage",
            &RuleScope::Dataset("other".to_string()),
        ))
        .await
        .unwrap();
    assert!(miss.is_empty());
}

#[tokio::test]
async fn missing_api_key_fails_every_call() {
    let backend = ReqwestBackend::new("http://127.0.0.1:9", None).unwrap();
    let api = PlatformApi::new(Arc::new(backend));

    let err = api.workspace_settings().await.unwrap_err();
    assert!(matches!(err, TransportError::MissingApiKey));
}
