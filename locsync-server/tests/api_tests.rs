//! Integration tests for locsync-server API endpoints
//!
//! Tests cover:
//! - Capture session lifecycle (open/heartbeat/close/status, conflicts, expiry)
//! - Capture event ingestion and diff classification
//! - Diff-apply reconciliation and replay idempotency
//! - Language-pack source/target imports and counts
//! - Pull/export with canonical ordering, fallback, and ETags
//! - Project and token provisioning

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use locsync_common::db::models::TranslationStatus;
use locsync_common::db::secrets::Secrets;
use locsync_common::db::create_schema;
use locsync_common::token;
use locsync_server::db::{aggregates, entries, placements, projects, tokens, translations};
use locsync_server::{build_router, AppState, SessionWindows};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot` method

const INTERNAL_SECRET: &str = "internal-test-secret";

/// Test helper: in-memory database with the full schema.
/// One connection so every handler sees the same memory database.
async fn setup_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");
    create_schema(&pool).await.expect("Should create schema");
    pool
}

fn test_secrets() -> Secrets {
    Secrets {
        token_hmac_secret: b"test-hmac-secret".to_vec(),
        vault_key: [7u8; 32],
        internal_secret: INTERNAL_SECRET.to_string(),
    }
}

fn test_windows() -> SessionWindows {
    SessionWindows {
        heartbeat_staleness: Duration::seconds(60),
        gate_ttl: Duration::hours(12),
    }
}

fn setup_app(db: SqlitePool) -> axum::Router {
    let state = AppState::new(db, test_secrets(), test_windows());
    build_router(state)
}

/// Test helper: seed a project with an installed runtime token.
/// Returns (project guid, plaintext token).
async fn seed_project(db: &SqlitePool) -> (String, String) {
    let secrets = test_secrets();
    let project = projects::create_project(
        db,
        "Demo App",
        "demo",
        "en",
        &["fr".to_string(), "zh".to_string()],
    )
    .await
    .expect("Should create project");

    let plaintext = token::generate_token().expect("Should generate token");
    let hash = token::hash_token(&secrets.token_hmac_secret, &plaintext);
    let sealed = token::seal_token(&secrets.vault_key, &plaintext).expect("Should seal token");
    tokens::upsert(db, &project.guid, &hash, &sealed, None)
        .await
        .expect("Should install token");

    (project.guid, plaintext)
}

fn sdk_post(uri: &str, bearer: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sdk_get(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::empty())
        .unwrap()
}

fn internal_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-internal-secret", INTERNAL_SECRET)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn internal_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-internal-secret", INTERNAL_SECRET)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health Endpoint
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let db = setup_db().await;
    let app = setup_app(db);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "locsync-server");
    assert!(body["version"].is_string());
}

// =============================================================================
// Capture Session Lifecycle
// =============================================================================

#[tokio::test]
async fn test_session_open_returns_active_session() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let request = sdk_post(
        "/api/session/open",
        &bearer,
        json!({ "projectId": project_id, "sdkIdentity": "alice@dev", "env": "local" }),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["sdkIdentity"], "alice@dev");
    assert_eq!(body["env"], "local");
    assert!(body["sessionId"].is_string());
}

#[tokio::test]
async fn test_second_open_by_other_identity_conflicts_with_blocking_identity() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let request = sdk_post(
        "/api/session/open",
        &bearer,
        json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = sdk_post(
        "/api/session/open",
        &bearer,
        json!({ "projectId": project_id, "sdkIdentity": "bob@dev" }),
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "SESSION_CONFLICT");
    assert_eq!(body["error"]["blockingIdentity"], "alice@dev");
}

#[tokio::test]
async fn test_same_identity_reopen_refreshes_existing_session() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let open = json!({ "projectId": project_id, "sdkIdentity": "alice@dev" });

    let response = app
        .clone()
        .oneshot(sdk_post("/api/session/open", &bearer, open.clone()))
        .await
        .unwrap();
    let first = extract_json(response.into_body()).await;

    let response = app
        .oneshot(sdk_post("/api/session/open", &bearer, open))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let second = extract_json(response.into_body()).await;
    assert_eq!(second["sessionId"], first["sessionId"]);
    assert_eq!(second["status"], "active");
}

#[tokio::test]
async fn test_heartbeat_by_other_identity_is_sdk_conflict() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    let opened = extract_json(response.into_body()).await;
    let session_id = opened["sessionId"].as_str().unwrap();

    let response = app
        .oneshot(sdk_post(
            "/api/session/heartbeat",
            &bearer,
            json!({
                "projectId": project_id,
                "sessionId": session_id,
                "sdkIdentity": "bob@dev",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "SDK_CONFLICT");
}

#[tokio::test]
async fn test_close_is_idempotent_and_preserves_first_reason() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    let opened = extract_json(response.into_body()).await;
    let session_id = opened["sessionId"].as_str().unwrap().to_string();

    let close = |reason: &str| {
        sdk_post(
            "/api/session/close",
            &bearer,
            json!({
                "projectId": project_id,
                "sessionId": session_id,
                "reason": reason,
            }),
        )
    };

    let response = app.clone().oneshot(close("saved")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "closed");
    assert_eq!(body["closeReason"], "saved");

    // Second close with a different reason returns the terminal state unchanged
    let response = app.oneshot(close("discarded")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "closed");
    assert_eq!(body["closeReason"], "saved");
}

#[tokio::test]
async fn test_close_rejects_reserved_timeout_reason() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    let opened = extract_json(response.into_body()).await;

    let response = app
        .oneshot(sdk_post(
            "/api/session/close",
            &bearer,
            json!({
                "projectId": project_id,
                "sessionId": opened["sessionId"],
                "reason": "timeout",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_stale_session_expires_and_frees_the_project() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .clone()
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    let opened = extract_json(response.into_body()).await;
    let session_id = opened["sessionId"].as_str().unwrap();

    // Backdate the heartbeat past the staleness window
    sqlx::query("UPDATE runtime_capture_sessions SET last_seen_at = ? WHERE guid = ?")
        .bind((Utc::now() - Duration::minutes(10)).to_rfc3339())
        .bind(session_id)
        .execute(&db)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(sdk_get(
            &format!(
                "/api/session/status?projectId={}&sessionId={}",
                project_id, session_id
            ),
            &bearer,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "expired");
    assert_eq!(body["closeReason"], "timeout");

    // The project is free again for a different identity
    let response = app
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "bob@dev" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(sdk_get(
            &format!(
                "/api/session/status?projectId={}&sessionId=no-such-session",
                project_id
            ),
            &bearer,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

// =============================================================================
// Capture Event Ingestion
// =============================================================================

#[tokio::test]
async fn test_capture_classifies_against_catalog() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "login.title": "Sign in" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(sdk_post(
            "/api/capture/events",
            &bearer,
            json!({
                "projectId": project_id,
                "observations": [
                    { "route": "/login", "key": "login.title", "sourceText": "Sign in" },
                    { "route": "/login", "key": "login.subtitle", "sourceText": "Welcome back" },
                    { "route": "/login", "key": "login.title", "sourceText": "Log in" },
                ],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["newKeys"], 1);
    assert_eq!(body["textChanged"], 1);
    assert_eq!(body["unchanged"], 1);
    assert_eq!(body["observations"][0]["classification"], "none");
    assert_eq!(body["observations"][1]["classification"], "new_key");
    assert_eq!(body["observations"][2]["classification"], "text_changed");
}

#[tokio::test]
async fn test_capture_never_mutates_the_catalog() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .oneshot(sdk_post(
            "/api/capture/events",
            &bearer,
            json!({
                "projectId": project_id,
                "observations": [
                    { "route": "/home", "key": "home.title", "sourceText": "Hello" },
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entry = entries::get_by_key(&db, &project_id, "home.title")
        .await
        .unwrap();
    assert!(entry.is_none());
}

#[tokio::test]
async fn test_repeated_observation_bumps_aggregate_counter() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let batch = json!({
        "projectId": project_id,
        "observations": [
            { "route": "/home", "key": "home.title", "sourceText": "Hello" },
        ],
    });

    let response = app
        .clone()
        .oneshot(sdk_post("/api/capture/events", &bearer, batch.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let first = aggregates::get(&db, &project_id, "/home", "home.title")
        .await
        .unwrap()
        .expect("aggregate row after first observation");
    assert_eq!(first.count, 1);

    let response = app
        .oneshot(sdk_post("/api/capture/events", &bearer, batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same (route, key) again: the counter rolls up instead of adding rows
    let second = aggregates::get(&db, &project_id, "/home", "home.title")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.count, 2);
    assert!(second.last_seen_at > first.last_seen_at);
}

#[tokio::test]
async fn test_capture_validation_reports_indexed_fields() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(sdk_post(
            "/api/capture/events",
            &bearer,
            json!({
                "projectId": project_id,
                "observations": [
                    { "route": "/login", "key": "ok.key", "sourceText": "fine" },
                    { "route": "", "key": "", "sourceText": "broken" },
                ],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"observations[1].route"));
    assert!(fields.contains(&"observations[1].key"));
}

#[tokio::test]
async fn test_capture_rejected_after_gate_window_elapses() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .clone()
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    let opened = extract_json(response.into_body()).await;
    let session_id = opened["sessionId"].as_str().unwrap();

    // Session opened 13h ago but kept alive by heartbeats: past the gate
    sqlx::query("UPDATE runtime_capture_sessions SET started_at = ? WHERE guid = ?")
        .bind((Utc::now() - Duration::hours(13)).to_rfc3339())
        .bind(session_id)
        .execute(&db)
        .await
        .unwrap();

    let response = app
        .oneshot(sdk_post(
            "/api/capture/events",
            &bearer,
            json!({
                "projectId": project_id,
                "sessionId": session_id,
                "observations": [
                    { "route": "/home", "key": "home.title", "sourceText": "Hello" },
                ],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "SESSION_NOT_ACTIVE");
}

// =============================================================================
// Diff Apply
// =============================================================================

#[tokio::test]
async fn test_apply_bind_creates_entry_placement_and_pending_translations() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .oneshot(internal_post(
            "/internal/diff/apply",
            json!({
                "applyId": "apply-1",
                "projectId": project_id,
                "route": "/login",
                "operations": [
                    {
                        "kind": "new_key",
                        "action": "bind",
                        "key": "login.title",
                        "sourceText": "Sign in",
                    },
                ],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["applyId"], "apply-1");
    assert_eq!(body["bound"], 1);
    assert_eq!(body["moved"], 0);
    assert_eq!(body["removed"], 0);

    let entry = entries::get_by_key(&db, &project_id, "login.title")
        .await
        .unwrap()
        .expect("entry should exist");
    assert_eq!(entry.source_text, "Sign in");

    let rows = placements::list_for_project(&db, &project_id).await.unwrap();
    assert_eq!(rows.len(), 1);

    // Pending translation set created for both target locales
    for locale in ["fr", "zh"] {
        let status = translations::get_status(&db, &entry.guid, locale)
            .await
            .unwrap();
        assert_eq!(status, Some(TranslationStatus::Pending));
    }
}

#[tokio::test]
async fn test_apply_replay_is_idempotent() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let batch = json!({
        "applyId": "apply-replay",
        "projectId": project_id,
        "route": "/login",
        "operations": [
            { "kind": "new_key", "action": "bind", "key": "login.title", "sourceText": "Sign in" },
            { "kind": "new_key", "action": "ignore" },
        ],
    });

    let response = app
        .clone()
        .oneshot(internal_post("/internal/diff/apply", batch.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(internal_post("/internal/diff/apply", batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["ignored"], 1);

    // Replaying the batch converges on the same single placement
    let rows = placements::list_for_project(&db, &project_id).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_apply_delete_removes_placement_but_keeps_entry() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/diff/apply",
            json!({
                "applyId": "apply-bind",
                "projectId": project_id,
                "route": "/login",
                "operations": [
                    { "kind": "new_key", "action": "bind", "key": "login.title", "sourceText": "Sign in" },
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (entry_id, module_id) = placements::list_for_project(&db, &project_id)
        .await
        .unwrap()
        .into_iter()
        .next()
        .expect("placement should exist");

    let response = app
        .oneshot(internal_post(
            "/internal/diff/apply",
            json!({
                "applyId": "apply-delete",
                "projectId": project_id,
                "route": "/login",
                "operations": [
                    {
                        "kind": "stale",
                        "action": "delete",
                        "entryId": entry_id,
                        "currentModuleId": module_id,
                    },
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["removed"], 1);

    let rows = placements::list_for_project(&db, &project_id).await.unwrap();
    assert!(rows.is_empty());

    // The entry survives its last placement
    let entry = entries::get_by_key(&db, &project_id, "login.title")
        .await
        .unwrap();
    assert!(entry.is_some());
}

#[tokio::test]
async fn test_apply_validation_reports_indexed_fields() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(internal_post(
            "/internal/diff/apply",
            json!({
                "applyId": "apply-bad",
                "projectId": project_id,
                "route": "/login",
                "operations": [
                    { "kind": "new_key", "action": "bind" },
                    { "kind": "stale", "action": "delete" },
                ],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"operations[0].key"));
    assert!(fields.contains(&"operations[1].entryId"));
    assert!(fields.contains(&"operations[1].currentModuleId"));
}

// =============================================================================
// Language-Pack Imports
// =============================================================================

#[tokio::test]
async fn test_source_import_counts_and_reimport_detects_changes() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": {
                    "login.title": "Sign in",
                    "login.subtitle": "Welcome back",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["added"], 2);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["unchanged"], 0);

    let response = app
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": {
                    "login.title": "Log in",
                    "login.subtitle": "Welcome back",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["added"], 0);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["unchanged"], 1);
}

#[tokio::test]
async fn test_source_change_demotes_approved_translations() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "login.title": "Sign in" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entry = entries::get_by_key(&db, &project_id, "login.title")
        .await
        .unwrap()
        .unwrap();
    translations::set_status(&db, &entry.guid, "fr", TranslationStatus::Approved)
        .await
        .unwrap();

    let response = app
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "login.title": "Log in" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["updated"], 1);
    assert_eq!(body["translationsMarkedNeedsUpdate"], 1);

    let status = translations::get_status(&db, &entry.guid, "fr")
        .await
        .unwrap();
    assert_eq!(status, Some(TranslationStatus::NeedsUpdate));
}

#[tokio::test]
async fn test_target_import_counts_and_marks_needs_review() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db.clone());

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": {
                    "login.title": "Sign in",
                    "login.subtitle": "Welcome back",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(internal_post(
            "/internal/import/target",
            json!({
                "projectId": project_id,
                "locale": "zh",
                "document": {
                    "login.title": "登录",
                    "ghost.key": "再见",
                    "login.subtitle": "  ",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["updated"], 1);
    assert_eq!(body["ignored"], 1);
    assert_eq!(body["skippedEmpty"], 1);

    let entry = entries::get_by_key(&db, &project_id, "login.title")
        .await
        .unwrap()
        .unwrap();
    let status = translations::get_status(&db, &entry.guid, "zh")
        .await
        .unwrap();
    assert_eq!(status, Some(TranslationStatus::NeedsReview));
}

#[tokio::test]
async fn test_target_import_unknown_locale_is_not_found() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(internal_post(
            "/internal/import/target",
            json!({
                "projectId": project_id,
                "locale": "de",
                "document": { "login.title": "Anmelden" },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_import_rejects_non_object_document() {
    let db = setup_db().await;
    let (project_id, _bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(internal_post(
            "/internal/import/source",
            json!({ "projectId": project_id, "document": ["not", "an", "object"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// =============================================================================
// Pull / Export
// =============================================================================

#[tokio::test]
async fn test_pull_target_locale_falls_back_to_source_text() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": {
                    "login.title": "Sign in",
                    "login.subtitle": "Welcome back",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/target",
            json!({
                "projectId": project_id,
                "locale": "fr",
                "document": { "login.title": "Connexion" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(sdk_get(
            &format!("/api/pull?projectId={}&locale=fr", project_id),
            &bearer,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let doc = &body["documents"]["fr"];
    assert_eq!(doc["login.title"], "Connexion");
    assert_eq!(doc["login.subtitle"], "Welcome back");
}

#[tokio::test]
async fn test_tree_export_preserves_template_order() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    // Nested document; key order c before a deliberately not alphabetical
    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "c": "C text", "a": { "b": "AB text" } },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(sdk_get(
            &format!("/api/pull?projectId={}&locale=en", project_id),
            &bearer,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let doc = &body["documents"]["en"];
    assert_eq!(doc["c"], "C text");
    assert_eq!(doc["a"]["b"], "AB text");

    // Document order follows the imported template, not alphabetical order
    let rendered = serde_json::to_string(doc).unwrap();
    assert_eq!(rendered, r#"{"c":"C text","a":{"b":"AB text"}}"#);
}

#[tokio::test]
async fn test_export_appends_untracked_keys_after_template() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    // Template records only the imported keys, deliberately unsorted
    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "z.last": "Z text", "m.mid": "M text" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A key bound through diff-apply exists in the catalog but not the template
    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/diff/apply",
            json!({
                "applyId": "apply-untracked",
                "projectId": project_id,
                "route": "/home",
                "operations": [
                    { "kind": "new_key", "action": "bind", "key": "a.first", "sourceText": "A text" },
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(sdk_get(
            &format!("/api/pull?projectId={}&locale=en", project_id),
            &bearer,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let doc = &body["documents"]["en"];
    assert_eq!(doc["a.first"], "A text");

    // Template keys first in recorded order, untracked keys appended after
    let rendered = serde_json::to_string(doc).unwrap();
    assert_eq!(
        rendered,
        r#"{"z.last":"Z text","m.mid":"M text","a.first":"A text"}"#
    );
}

#[tokio::test]
async fn test_pull_etag_is_stable_and_if_none_match_returns_304() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({ "projectId": project_id, "document": { "k": "v" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uri = format!("/api/pull?projectId={}&locales=en,fr", project_id);

    let response = app.clone().oneshot(sdk_get(&uri, &bearer)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response
        .headers()
        .get(header::ETAG)
        .expect("ETag present")
        .to_str()
        .unwrap()
        .to_string();

    // Identical catalog state produces the identical tag
    let response = app.clone().oneshot(sdk_get(&uri, &bearer)).await.unwrap();
    let etag2 = response.headers().get(header::ETAG).unwrap().to_str().unwrap();
    assert_eq!(etag, etag2);

    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    // A target import moves the tag
    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/target",
            json!({
                "projectId": project_id,
                "locale": "fr",
                "document": { "k": "valeur" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(sdk_get(&uri, &bearer)).await.unwrap();
    let etag3 = response.headers().get(header::ETAG).unwrap().to_str().unwrap();
    assert_ne!(etag, etag3);
}

#[tokio::test]
async fn test_export_then_reimport_is_a_noop() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/import/source",
            json!({
                "projectId": project_id,
                "document": { "b": "B", "a": "A" },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(sdk_get(
            &format!("/api/pull?projectId={}&locale=en", project_id),
            &bearer,
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let exported = body["documents"]["en"].clone();

    let response = app
        .oneshot(internal_post(
            "/internal/import/source",
            json!({ "projectId": project_id, "document": exported }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["added"], 0);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["unchanged"], 2);
}

#[tokio::test]
async fn test_pull_unknown_locale_is_not_found() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(sdk_get(
            &format!("/api/pull?projectId={}&locale=de", project_id),
            &bearer,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Project and Token Provisioning
// =============================================================================

#[tokio::test]
async fn test_create_project_mints_usable_token() {
    let db = setup_db().await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            "/internal/projects",
            json!({
                "name": "Demo App",
                "slug": "demo",
                "sourceLocale": "en",
                "targetLocales": ["fr"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let project_id = body["projectId"].as_str().unwrap().to_string();
    let bearer = body["token"].as_str().unwrap().to_string();
    assert!(bearer.starts_with("lsk_"));

    // The minted token authenticates the SDK surface immediately
    let response = app
        .oneshot(sdk_post(
            "/api/session/open",
            &bearer,
            json!({ "projectId": project_id, "sdkIdentity": "alice@dev" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotate_invalidates_old_token() {
    let db = setup_db().await;
    let (project_id, old_bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .clone()
        .oneshot(internal_post(
            &format!("/internal/projects/{}/token/rotate", project_id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let new_bearer = body["token"].as_str().unwrap().to_string();
    assert_ne!(new_bearer, old_bearer);

    let open = json!({ "projectId": project_id, "sdkIdentity": "alice@dev" });

    let response = app
        .clone()
        .oneshot(sdk_post("/api/session/open", &old_bearer, open.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(sdk_post("/api/session/open", &new_bearer, open))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reveal_returns_current_token() {
    let db = setup_db().await;
    let (project_id, bearer) = seed_project(&db).await;
    let app = setup_app(db);

    let response = app
        .oneshot(internal_get(&format!(
            "/internal/projects/{}/token",
            project_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["token"], bearer);
}

#[tokio::test]
async fn test_create_project_validates_locales() {
    let db = setup_db().await;
    let app = setup_app(db);

    let response = app
        .oneshot(internal_post(
            "/internal/projects",
            json!({
                "name": "Demo",
                "slug": "demo",
                "sourceLocale": "en",
                "targetLocales": ["en"],
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["fields"][0]["field"], "targetLocales[0]");
}
