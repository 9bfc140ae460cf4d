//! Capture session handlers

use crate::error::{ApiError, ApiResult, FieldError};
use crate::session::{self, SessionPayload};
use crate::AppState;
use axum::extract::{Query, State};
use axum::Json;
use locsync_common::db::models::CloseReason;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub project_id: String,
    pub sdk_identity: String,
    #[serde(default)]
    pub env: Option<String>,
}

pub async fn open(
    State(state): State<AppState>,
    Json(req): Json<OpenRequest>,
) -> ApiResult<Json<SessionPayload>> {
    if req.sdk_identity.trim().is_empty() {
        return Err(ApiError::invalid("sdkIdentity", "required"));
    }

    let payload = session::open(
        &state.db,
        &state.windows,
        &req.project_id,
        req.sdk_identity.trim(),
        req.env.as_deref(),
    )
    .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub project_id: String,
    pub session_id: String,
    #[serde(default)]
    pub sdk_identity: Option<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<SessionPayload>> {
    let payload = session::heartbeat(
        &state.db,
        &state.windows,
        &req.project_id,
        &req.session_id,
        req.sdk_identity.as_deref(),
    )
    .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    pub project_id: String,
    pub session_id: String,
    #[serde(default)]
    pub sdk_identity: Option<String>,
    pub reason: String,
}

pub async fn close(
    State(state): State<AppState>,
    Json(req): Json<CloseRequest>,
) -> ApiResult<Json<SessionPayload>> {
    // `timeout` is reserved for the staleness sweep
    let reason = match CloseReason::parse(&req.reason) {
        Some(reason) if reason != CloseReason::Timeout => reason,
        _ => {
            return Err(ApiError::Validation(vec![FieldError::new(
                "reason",
                "must be one of: saved, discarded, forced",
            )]))
        }
    };

    let payload = session::close(
        &state.db,
        &req.project_id,
        &req.session_id,
        req.sdk_identity.as_deref(),
        reason,
    )
    .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub project_id: String,
    pub session_id: String,
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<SessionPayload>> {
    let payload = session::status(
        &state.db,
        &state.windows,
        &query.project_id,
        &query.session_id,
    )
    .await?;
    Ok(Json(payload))
}
