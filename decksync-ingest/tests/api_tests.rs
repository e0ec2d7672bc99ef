//! HTTP API tests
//!
//! Drives the router with `oneshot` requests; the orchestrator behind it
//! talks to the fixture site and an in-memory database.

mod helpers;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use decksync_ingest::db::SqliteGateway;
use decksync_ingest::services::SyncOrchestrator;
use decksync_ingest::{build_router, AppState};
use tokio_util::sync::CancellationToken;

use helpers::*;

fn fixture_source() -> Arc<FixtureSource> {
    let source = Arc::new(FixtureSource::new());
    source.set_listing(1, listing_html(&[row("T1", "Regional Berlin", "2024-03-02")], None));
    source.set_detail("T1", decklist_html(&standard_decks(3)));
    source
}

async fn setup_state(token: Option<&str>) -> AppState {
    let pool = create_test_db().await;
    let orchestrator = create_test_orchestrator(fixture_source(), &pool);
    AppState::new(pool, Arc::new(orchestrator), token.map(str::to_string))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_reports_ok_and_idle() {
    let app = build_router(setup_state(None).await);

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "decksync-ingest");
    assert_eq!(body["source"], SOURCE);
    assert_eq!(body["sync_running"], false);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_last_result_missing_before_first_run() {
    let app = build_router(setup_state(None).await);

    let (status, body) = send(&app, get("/sync/last")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_run_returns_result_and_stores_it() {
    let app = build_router(setup_state(None).await);

    let (status, body) = send(&app, post("/sync/run", "", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "COMPLETED");
    assert_eq!(body["complete"], true);
    assert_eq!(body["tournaments_created"], 1);
    assert_eq!(body["decks_created"], 3);

    let (status, last) = send(&app, get("/sync/last")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["run_id"], body["run_id"]);

    // Slot released once the run returned
    let (_, health) = send(&app, get("/health")).await;
    assert_eq!(health["sync_running"], false);
}

#[tokio::test]
async fn test_run_accepts_parameter_overrides() {
    let app = build_router(setup_state(None).await);

    let (status, body) = send(
        &app,
        post("/sync/run", r#"{"page_cap": 1, "deck_scope": "missing_decks"}"#, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decks_created"], 3);

    // Every tournament now has decks, so the scoped run fetches nothing new
    let (status, body) = send(
        &app,
        post("/sync/run", r#"{"deck_scope": "missing_decks"}"#, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decks_created"], 0);
    assert_eq!(body["decks_updated"], 0);
}

#[tokio::test]
async fn test_malformed_parameters_rejected() {
    let app = build_router(setup_state(None).await);

    let (status, body) = send(&app, post("/sync/run", r#"{"worker_limit": -2}"#, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_cancel_when_idle_is_not_found() {
    let app = build_router(setup_state(None).await);

    let (status, _) = send(&app, post("/sync/cancel", "", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_signals_active_run() {
    let state = setup_state(None).await;
    let token = CancellationToken::new();
    *state.active_run.lock().unwrap() = Some(token.clone());
    let app = build_router(state);

    let (status, body) = send(&app, post("/sync/cancel", "", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_second_trigger_conflicts_while_run_active() {
    let state = setup_state(None).await;
    *state.active_run.lock().unwrap() = Some(CancellationToken::new());
    let app = build_router(state);

    let (status, body) = send(&app, post("/sync/run", "", None)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, health) = send(&app, get("/health")).await;
    assert_eq!(health["sync_running"], true);
}

#[tokio::test]
async fn test_trigger_token_enforced() {
    let app = build_router(setup_state(Some("s3cret")).await);

    let (status, _) = send(&app, post("/sync/run", "", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, post("/sync/run", "", Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, post("/sync/cancel", "", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Read-only endpoints stay open
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, post("/sync/run", "", Some("s3cret"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_fatal_run_returns_partial_result() {
    let pool = create_test_db().await;
    let orchestrator = SyncOrchestrator::new(
        fixture_source(),
        Arc::new(UnavailableCatalog),
        Arc::new(SqliteGateway::new(pool.clone())),
        test_params(),
    );
    let app = build_router(AppState::new(pool, Arc::new(orchestrator), None));

    let (status, body) = send(&app, post("/sync/run", "", None)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "CATALOG_UNAVAILABLE");
    assert_eq!(body["partial"]["state"], "FAILED");
    assert_eq!(body["partial"]["tournaments_created"], 1);

    let (status, last) = send(&app, get("/sync/last")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["state"], "FAILED");

    let (_, health) = send(&app, get("/health")).await;
    assert!(health["last_error"]
        .as_str()
        .is_some_and(|e| e.contains("catalog")));
}
