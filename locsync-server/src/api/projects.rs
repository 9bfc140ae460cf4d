//! Project and runtime-token provisioning (internal surface)
//!
//! Token plaintext appears in exactly two responses: the create that mints
//! it and an explicit reveal. Storage only ever sees the keyed hash and the
//! sealed form.

use crate::db::{projects, tokens};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use locsync_common::token;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub slug: String,
    pub source_locale: String,
    #[serde(default)]
    pub target_locales: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectResponse {
    pub project_id: String,
    pub name: String,
    pub slug: String,
    pub source_locale: String,
    pub target_locales: Vec<String>,
    /// Freshly minted runtime token, shown once here
    pub token: String,
}

fn validate_create(req: &CreateProjectRequest) -> ApiResult<()> {
    let mut errors = Vec::new();

    if req.name.trim().is_empty() {
        errors.push(FieldError::new("name", "required"));
    }
    if req.slug.trim().is_empty() {
        errors.push(FieldError::new("slug", "required"));
    }
    if req.source_locale.trim().is_empty() {
        errors.push(FieldError::new("sourceLocale", "required"));
    }
    for (i, locale) in req.target_locales.iter().enumerate() {
        if locale.trim().is_empty() {
            errors.push(FieldError::new(
                format!("targetLocales[{}]", i),
                "must not be blank",
            ));
        } else if locale.trim() == req.source_locale.trim() {
            errors.push(FieldError::new(
                format!("targetLocales[{}]", i),
                "must differ from sourceLocale",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

async fn mint_token(state: &AppState, project_id: &str) -> ApiResult<String> {
    let plaintext = token::generate_token()?;
    let hash = token::hash_token(&state.secrets.token_hmac_secret, &plaintext);
    let sealed = token::seal_token(&state.secrets.vault_key, &plaintext)?;
    tokens::upsert(&state.db, project_id, &hash, &sealed, None).await?;
    Ok(plaintext)
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<Json<CreateProjectResponse>> {
    validate_create(&req)?;

    let target_locales: Vec<String> = req
        .target_locales
        .iter()
        .map(|l| l.trim().to_string())
        .collect();

    let project = projects::create_project(
        &state.db,
        req.name.trim(),
        req.slug.trim(),
        req.source_locale.trim(),
        &target_locales,
    )
    .await?;

    let plaintext = mint_token(&state, &project.guid).await?;

    info!(project_id = %project.guid, slug = %project.slug, "Project created");

    Ok(Json(CreateProjectResponse {
        project_id: project.guid,
        name: project.name,
        slug: project.slug,
        source_locale: project.source_locale,
        target_locales: project.target_locales,
        token: plaintext,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub project_id: String,
    pub token: String,
}

pub async fn rotate_token(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    projects::get_project(&state.db, &project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    let plaintext = mint_token(&state, &project_id).await?;

    info!(%project_id, "Runtime token rotated");

    Ok(Json(TokenResponse {
        project_id,
        token: plaintext,
    }))
}

pub async fn reveal_token(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<TokenResponse>> {
    let record = tokens::get(&state.db, &project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No token issued for this project".to_string()))?;

    let plaintext = token::open_token(&state.secrets.vault_key, &record.token_sealed)?;

    Ok(Json(TokenResponse {
        project_id,
        token: plaintext,
    }))
}
