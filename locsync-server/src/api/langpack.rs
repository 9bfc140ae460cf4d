//! Language-pack import handlers (internal surface)

use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::langpack::{self, SourceImportReport, TargetImportReport};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use locsync_common::db::models::Project;
use serde::Deserialize;
use serde_json::Value;

async fn load_project(state: &AppState, project_id: &str) -> ApiResult<Project> {
    projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSourceRequest {
    pub project_id: String,
    pub document: Value,
}

pub async fn import_source(
    State(state): State<AppState>,
    Json(req): Json<ImportSourceRequest>,
) -> ApiResult<Json<SourceImportReport>> {
    let project = load_project(&state, &req.project_id).await?;
    let report = langpack::import_source(&state.db, &project, &req.document).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTargetRequest {
    pub project_id: String,
    pub locale: String,
    pub document: Value,
}

pub async fn import_target(
    State(state): State<AppState>,
    Json(req): Json<ImportTargetRequest>,
) -> ApiResult<Json<TargetImportReport>> {
    if req.locale.trim().is_empty() {
        return Err(ApiError::invalid("locale", "required"));
    }

    let project = load_project(&state, &req.project_id).await?;
    let report =
        langpack::import_target(&state.db, &project, req.locale.trim(), &req.document).await?;
    Ok(Json(report))
}
