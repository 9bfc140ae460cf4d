//! API error taxonomy
//!
//! Validation failures are reported field-by-field, authorization failures
//! short-circuit before any catalog access, and reconciler failures abort the
//! whole batch and surface as INTERNAL_ERROR (the caller retries the same
//! batch safely; diff-apply is idempotent).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input; always recoverable client-side (400)
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Missing/invalid/expired token (401). Deliberately undifferentiated:
    /// "no such project" and "wrong token" produce the same response.
    #[error("Unauthorized")]
    Unauthorized,

    /// Unknown project or locale (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown capture session (404)
    #[error("Session not found")]
    SessionNotFound,

    /// Session exists but is not active (409)
    #[error("Session not active: {0}")]
    SessionNotActive(String),

    /// Another SDK identity holds the active session (409)
    #[error("Session conflict")]
    SessionConflict { blocking_identity: Option<String> },

    /// Caller identity does not match the session's recorded identity (409)
    #[error("SDK identity conflict: {0}")]
    SdkConflict(String),

    /// Unexpected failure or unreachable dependency (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// locsync-common error
    #[error("Common error: {0}")]
    Common(#[from] locsync_common::Error),
}

impl ApiError {
    /// Single-field validation shortcut
    pub fn invalid(field: &str, message: &str) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(json!({ "fields": fields })),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or missing credentials".to_string(),
                None,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::SessionNotFound => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                "Capture session not found".to_string(),
                None,
            ),
            ApiError::SessionNotActive(msg) => {
                (StatusCode::CONFLICT, "SESSION_NOT_ACTIVE", msg, None)
            }
            ApiError::SessionConflict { blocking_identity } => (
                StatusCode::CONFLICT,
                "SESSION_CONFLICT",
                "Another capture session is active for this project".to_string(),
                Some(json!({ "blockingIdentity": blocking_identity })),
            ),
            ApiError::SdkConflict(msg) => (StatusCode::CONFLICT, "SDK_CONFLICT", msg, None),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiError::Database(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                None,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                None,
            ),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let (Some(obj), Some(details)) = (error.as_object_mut(), details) {
            if let Some(extra) = details.as_object() {
                for (k, v) in extra {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
