//! Language-pack pull handler
//!
//! Serves rendered documents with an ETag so SDK clients can poll cheaply:
//! a matching `If-None-Match` short-circuits to 304 with no body.

use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::langpack::export;
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullQuery {
    pub project_id: String,
    /// Single locale
    #[serde(default)]
    pub locale: Option<String>,
    /// Comma-separated list, alternative to `locale`
    #[serde(default)]
    pub locales: Option<String>,
}

fn requested_locales(query: &PullQuery) -> ApiResult<Vec<String>> {
    let locales: Vec<String> = match (&query.locale, &query.locales) {
        (Some(one), None) => vec![one.trim().to_string()],
        (None, Some(many)) => many
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        (Some(_), Some(_)) => {
            return Err(ApiError::invalid(
                "locales",
                "specify either locale or locales, not both",
            ))
        }
        (None, None) => Vec::new(),
    };

    if locales.is_empty() || locales.iter().any(|l| l.is_empty()) {
        return Err(ApiError::invalid("locale", "at least one locale required"));
    }
    Ok(locales)
}

pub async fn pull(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PullQuery>,
) -> ApiResult<Response> {
    let locales = requested_locales(&query)?;

    let project = projects::get_project(&state.db, &query.project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    // Conditional fetch: compare before rendering any documents
    let etag = export::derive_etag(&state.db, &project, &locales).await?;
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH) {
        if if_none_match.to_str().map(|v| v == etag).unwrap_or(false) {
            return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
        }
    }

    let result = export::export(&state.db, &project, &locales).await?;

    let mut documents = Map::new();
    for (locale, document) in result.documents {
        documents.insert(locale, document);
    }
    let body: Value = json!({
        "projectId": project.guid,
        "documents": documents,
    });

    Ok(([(header::ETAG, result.etag)], Json(body)).into_response())
}
