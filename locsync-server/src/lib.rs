//! locsync-server library - localization catalog service
//!
//! Hosts the four core engines behind one axum router: the capture-session
//! state machine, the capture ingestion/diff classifier, the diff-apply
//! reconciler, and the language-pack import/export engine.

use axum::Router;
use chrono::Duration;
use locsync_common::config::Config;
use locsync_common::db::secrets::Secrets;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod capture;
pub mod db;
pub mod error;
pub mod langpack;
pub mod reconcile;
pub mod session;

/// The two session timeouts. Heartbeat staleness governs liveness expiry;
/// the gate TTL bounds how long an open session accepts capture. They serve
/// different purposes and are never interchangeable.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindows {
    pub heartbeat_staleness: Duration,
    pub gate_ttl: Duration,
}

impl SessionWindows {
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_staleness: Duration::from_std(config.heartbeat_staleness)
                .unwrap_or_else(|_| Duration::seconds(60)),
            gate_ttl: Duration::from_std(config.session_gate_ttl)
                .unwrap_or_else(|_| Duration::hours(12)),
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Key material loaded at startup
    pub secrets: Arc<Secrets>,
    /// Session staleness/gate windows
    pub windows: SessionWindows,
}

impl AppState {
    pub fn new(db: SqlitePool, secrets: Secrets, windows: SessionWindows) -> Self {
        Self {
            db,
            secrets: Arc::new(secrets),
            windows,
        }
    }
}

/// Build the application router.
///
/// Three surfaces: public (health), SDK-facing (bearer-token auth), and
/// service-to-service (distinct internal secret header).
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let sdk = Router::new()
        .route("/api/session/open", post(api::session::open))
        .route("/api/session/heartbeat", post(api::session::heartbeat))
        .route("/api/session/close", post(api::session::close))
        .route("/api/session/status", get(api::session::status))
        .route("/api/capture/events", post(api::capture::ingest_events))
        .route("/api/pull", get(api::pull::pull))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::bearer_auth,
        ));

    let internal = Router::new()
        .route("/internal/diff/apply", post(api::apply::diff_apply))
        .route("/internal/import/source", post(api::langpack::import_source))
        .route("/internal/import/target", post(api::langpack::import_target))
        .route("/internal/projects", post(api::projects::create_project))
        .route(
            "/internal/projects/:project_id/token/rotate",
            post(api::projects::rotate_token),
        )
        .route(
            "/internal/projects/:project_id/token",
            get(api::projects::reveal_token),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::internal_auth,
        ));

    let public = Router::new().route("/health", get(api::health::health));

    Router::new()
        .merge(sdk)
        .merge(internal)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
