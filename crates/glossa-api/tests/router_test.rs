//! Router tests against the in-memory store.
//!
//! Each test builds a fresh router over `MemoryWorkItemRepository` and drives
//! it with `tower::ServiceExt::oneshot`, so no server or database is needed.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use glossa_api::{router, AppState};
use glossa_core::{ClaimRequest, Completion, FailReason, Scores, Stage, WorkItemRepository};
use glossa_db::MemoryWorkItemRepository;

fn app(repo: &Arc<MemoryWorkItemRepository>) -> Router {
    router(AppState::new(repo.clone()))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Drive one item through both stages as worker `w1`.
async fn score_item(repo: &MemoryWorkItemRepository, key: &str, scores: Scores) {
    let id = repo.submit(key).await.unwrap().item.id;
    repo.claim_next(&ClaimRequest::for_stage(Stage::Fetch, "w1"))
        .await
        .unwrap();
    repo.complete(id, "w1", &Completion::fetched(Some(60)))
        .await
        .unwrap();
    repo.claim_next(&ClaimRequest::for_stage(Stage::Score, "w1"))
        .await
        .unwrap();
    repo.complete(id, "w1", &Completion::scored(scores))
        .await
        .unwrap();
}

async fn fail_item(repo: &MemoryWorkItemRepository, key: &str, reason: Option<FailReason>) {
    let id = repo.submit(key).await.unwrap().item.id;
    repo.claim_next(&ClaimRequest::for_stage(Stage::Fetch, "w1"))
        .await
        .unwrap();
    repo.complete(id, "w1", &Completion::failed(reason, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_identify_queues_new_item() {
    let repo = Arc::new(MemoryWorkItemRepository::new());

    let (status, json) = get_json(app(&repo), "/ru/identify/5jeezDV1Cik").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "INIT");
    assert_eq!(json["queue_depth"], 1);

    // repeat submission does not add a second item
    let (_, json) = get_json(app(&repo), "/ru/identify/5jeezDV1Cik").await;
    assert_eq!(json["queue_depth"], 1);
    assert_eq!(repo.queue_stats().await.unwrap().total(), 1);
}

#[tokio::test]
async fn test_identify_returns_flat_scores_when_scored() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    let scores = Scores::from([
        ("ru".to_string(), 0.7),
        ("en".to_string(), 0.2),
        ("uk".to_string(), 0.1),
    ]);
    score_item(&repo, "abc", scores).await;

    let (status, json) = get_json(app(&repo), "/ru/identify/abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ru"], 0.7);
    assert_eq!(json["en"], 0.2);
    assert_eq!(json["uk"], 0.1);
    assert!(json.get("state").is_none());
}

#[tokio::test]
async fn test_identify_reports_failed_state() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    fail_item(&repo, "priv", Some(FailReason::PrivateVideo)).await;

    let (status, json) = get_json(app(&repo), "/ru/identify/priv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "FAILED");
    assert_eq!(json["queue_depth"], 0);
}

#[tokio::test]
async fn test_identify_rejects_bad_key() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    let long_key = "x".repeat(200);

    let (status, json) = get_json(app(&repo), &format!("/ru/identify/{long_key}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_identify_accepts_leading_dash() {
    let repo = Arc::new(MemoryWorkItemRepository::new());

    let (status, json) = get_json(app(&repo), "/ru/identify/-5jeezDV1Ci").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "INIT");
    assert!(repo.lookup("-5jeezDV1Ci").await.unwrap().is_some());
}

#[tokio::test]
async fn test_verify_fails_resets_unclassified_only() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    fail_item(&repo, "a", None).await;
    fail_item(&repo, "b", Some(FailReason::TooLong)).await;

    let (status, json) = get_json(app(&repo), "/verify/fails").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reset"], 1);

    let stats = repo.queue_stats().await.unwrap();
    assert_eq!(stats.init, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_recreate_db_clears_items() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    repo.submit("a").await.unwrap();
    repo.submit("b").await.unwrap();

    let (status, _) = get_json(app(&repo), "/recreate/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repo.queue_stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_get_item_and_stats() {
    let repo = Arc::new(MemoryWorkItemRepository::new());

    let (status, json) = get_json(app(&repo), "/api/v1/items/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("missing"));

    repo.submit("abc").await.unwrap();
    let (status, json) = get_json(app(&repo), "/api/v1/items/abc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source_key"], "abc");
    assert_eq!(json["state"], "INIT");
    assert!(json["owner"].is_null());

    let (status, json) = get_json(app(&repo), "/api/v1/queue/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["init"], 1);
    assert_eq!(json["scored"], 0);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let repo = Arc::new(MemoryWorkItemRepository::new());
    let response = app(&repo)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
