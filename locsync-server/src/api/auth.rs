//! Authentication middleware
//!
//! Two surfaces, two credentials:
//!
//! - SDK routes present a per-project bearer token (`Authorization: Bearer`,
//!   legacy fallback `X-LocSync-Token`) verified against the stored keyed
//!   hash. Every failure mode collapses into one undifferentiated 401 so
//!   the response does not reveal whether the project exists.
//! - Internal routes present the service-to-service secret in
//!   `X-Internal-Secret`.
//!
//! Bearer auth is project-scoped, so the middleware resolves the projectId
//! from the query string or, for POST bodies, by buffering and restoring
//! the JSON body (handlers downstream see the body untouched).

use crate::db::tokens;
use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use locsync_common::token;

/// Legacy SDK header, kept for clients predating bearer support
const LEGACY_TOKEN_HEADER: &str = "x-locsync-token";

/// Service-to-service credential header
const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Body size cap when buffering for projectId extraction
const MAX_BODY_BYTES: usize = 1024 * 1024;

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    // Legacy fallback header
    headers
        .get(LEGACY_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// Bearer-token middleware for SDK-facing routes.
pub async fn bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = extract_bearer(request.headers()).ok_or(ApiError::Unauthorized)?;

    // projectId from the query string (GET routes) or the JSON body (POST)
    let mut project_id = query_param(request.uri().query(), "projectId");

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::invalid("body", &format!("failed to read body: {}", e)))?;

    if project_id.is_none() && !body_bytes.is_empty() {
        let json: serde_json::Value = serde_json::from_slice(&body_bytes)
            .map_err(|e| ApiError::invalid("body", &format!("invalid JSON: {}", e)))?;
        project_id = json
            .get("projectId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    let project_id = project_id
        .ok_or_else(|| ApiError::invalid("projectId", "required"))?;

    // All credential failures produce the same undifferentiated result
    let record = tokens::get(&state.db, &project_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::Unauthorized)?;

    if !record.enabled {
        return Err(ApiError::Unauthorized);
    }
    if let Some(expires_at) = record.expires_at {
        if expires_at < Utc::now() {
            return Err(ApiError::Unauthorized);
        }
    }
    if !token::verify_token(&state.secrets.token_hmac_secret, &presented, &record.token_hash) {
        return Err(ApiError::Unauthorized);
    }

    // Best-effort; never fails the authenticated request
    tokens::touch_last_used(&state.db, &project_id).await;

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

/// Internal-secret middleware for the service-to-service surface.
pub async fn internal_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !token::secrets_equal(presented, &state.secrets.internal_secret) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
