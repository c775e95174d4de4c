mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{test_app, test_state, test_state_with_cache};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_is_unauthenticated_and_reports_identity() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("server_commit").is_some());
    assert!(body.get("rules_commit").is_some());
}

#[tokio::test]
async fn missing_bearer_token_is_unauthorized() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(Request::builder().uri("/rules").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bearer_token_is_unauthorized() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rules")
                .header("Authorization", "Basic not-a-bearer-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_rules_returns_current_snapshot() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rules")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("hash").is_some());
    assert!(body.get("rules").is_some());
}

#[tokio::test]
async fn jobs_dispatch_without_cache() {
    let state = test_state().await;
    state
        .store
        .insert_scan("pkg", "1.0", "queuer", vec!["https://example.test/pkg-1.0.tar.gz".to_string()])
        .await
        .unwrap();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs?batch=5")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["name"], "pkg");
}

#[tokio::test]
async fn single_job_endpoint_reports_no_job_available() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/job")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "No job available");
}

#[tokio::test]
async fn verdict_ingestion_then_double_submit_conflicts() {
    let state = test_state().await;
    state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();
    let app = test_app(state);

    let verdict = json!({
        "name": "pkg",
        "version": "1.0",
        "commit": "abc123",
        "score": 9,
        "inspector_url": "https://inspector.test/pkg/1.0",
        "rules_matched": ["suspicious-network-call"],
    });

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/package")
                .header("Authorization", "Bearer worker-1")
                .header("Content-Type", "application/json")
                .body(Body::from(verdict.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/package")
                .header("Authorization", "Bearer worker-1")
                .header("Content-Type", "application/json")
                .body(Body::from(verdict.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn lookup_rejects_invalid_query_combination() {
    let app = test_app(test_state().await);

    // version without name is not a valid combination (spec.md §4.B).
    let response = app
        .oneshot(
            Request::builder()
                .uri("/package?version=1.0")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lookup_by_name_returns_matching_scans() {
    let state = test_state().await;
    state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/package?name=pkg")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "pkg");
}

#[tokio::test]
async fn stats_reports_zero_on_an_empty_catalogue() {
    let app = test_app(test_state().await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ingested"], 0);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn cache_enabled_dispatch_defers_results_until_persisted() {
    // With the cache enabled, a queued scan is handed out via `acquire`
    // rather than a direct `lease_jobs` call; this exercises that path
    // hermetically against the fake store.
    let state = test_state_with_cache(4).await;
    state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();
    let app = test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs?batch=1")
                .header("Authorization", "Bearer worker-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
}
