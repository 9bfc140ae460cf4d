//! Diff-apply handler (internal surface)

use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::reconcile::{self, ApplyOperation, ApplyReport};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub apply_id: String,
    pub project_id: String,
    pub route: String,
    pub operations: Vec<ApplyOperation>,
}

pub async fn diff_apply(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<Json<ApplyReport>> {
    if req.apply_id.trim().is_empty() {
        return Err(ApiError::invalid("applyId", "required"));
    }
    if req.route.trim().is_empty() {
        return Err(ApiError::invalid("route", "required"));
    }

    let project = projects::get_project(&state.db, &req.project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    let report = reconcile::apply(
        &state.db,
        &project,
        req.apply_id.trim(),
        req.route.trim(),
        &req.operations,
    )
    .await?;
    Ok(Json(report))
}
