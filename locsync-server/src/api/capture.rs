//! Capture event ingestion handler

use crate::capture::{self, CaptureReport, Observation};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub project_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub observations: Vec<Observation>,
}

fn validate(observations: &[Observation]) -> ApiResult<()> {
    let mut errors = Vec::new();

    for (i, obs) in observations.iter().enumerate() {
        if obs.route.trim().is_empty() {
            errors.push(FieldError::new(
                format!("observations[{}].route", i),
                "required",
            ));
        }
        if obs.key.trim().is_empty() {
            errors.push(FieldError::new(
                format!("observations[{}].key", i),
                "required",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub async fn ingest_events(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<Json<CaptureReport>> {
    if req.observations.is_empty() {
        return Err(ApiError::invalid("observations", "must not be empty"));
    }
    validate(&req.observations)?;

    let report = capture::ingest(
        &state.db,
        &state.windows,
        &req.project_id,
        req.session_id.as_deref(),
        &req.observations,
    )
    .await?;
    Ok(Json(report))
}
