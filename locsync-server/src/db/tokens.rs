//! Project runtime token persistence

use chrono::{DateTime, Utc};
use locsync_common::db::models::RuntimeToken;
use locsync_common::{Error, Result};
use sqlx::{Row, SqlitePool};

pub async fn get(pool: &SqlitePool, project_id: &str) -> Result<Option<RuntimeToken>> {
    let row = sqlx::query(
        "SELECT project_id, token_hash, token_sealed, enabled, expires_at, last_used_at
         FROM project_runtime_tokens WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let expires_at: Option<String> = row.get("expires_at");
            let expires_at = expires_at
                .map(|s| DateTime::parse_from_rfc3339(&s))
                .transpose()
                .map_err(|e| Error::Internal(format!("Failed to parse expires_at: {}", e)))?
                .map(|dt| dt.with_timezone(&Utc));

            let last_used_at: Option<String> = row.get("last_used_at");
            let last_used_at = last_used_at
                .map(|s| DateTime::parse_from_rfc3339(&s))
                .transpose()
                .map_err(|e| Error::Internal(format!("Failed to parse last_used_at: {}", e)))?
                .map(|dt| dt.with_timezone(&Utc));

            Ok(Some(RuntimeToken {
                project_id: row.get("project_id"),
                token_hash: row.get("token_hash"),
                token_sealed: row.get("token_sealed"),
                enabled: row.get::<i64, _>("enabled") != 0,
                expires_at,
                last_used_at,
            }))
        }
        None => Ok(None),
    }
}

/// Install or rotate the project's token. Rotation re-enables a disabled
/// token and clears any expiry.
pub async fn upsert(
    pool: &SqlitePool,
    project_id: &str,
    token_hash: &str,
    token_sealed: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let now = super::now_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO project_runtime_tokens
            (project_id, token_hash, token_sealed, enabled, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?, ?)
        ON CONFLICT(project_id) DO UPDATE SET
            token_hash = excluded.token_hash,
            token_sealed = excluded.token_sealed,
            enabled = 1,
            expires_at = excluded.expires_at,
            last_used_at = NULL,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(project_id)
    .bind(token_hash)
    .bind(token_sealed)
    .bind(expires_at.map(|dt| dt.to_rfc3339()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort last_used_at update; a failure here must never fail the
/// request that authenticated successfully.
pub async fn touch_last_used(pool: &SqlitePool, project_id: &str) {
    let result =
        sqlx::query("UPDATE project_runtime_tokens SET last_used_at = ? WHERE project_id = ?")
            .bind(super::now_rfc3339())
            .bind(project_id)
            .execute(pool)
            .await;

    if let Err(e) = result {
        tracing::warn!("Failed to update token last_used_at: {}", e);
    }
}
