//! Runtime capture session persistence
//!
//! Row-level operations only; the open/heartbeat/close rules live in the
//! state machine (`crate::session`).

use chrono::{DateTime, Utc};
use locsync_common::db::models::{CaptureSession, CloseReason, SessionStatus};
use locsync_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CaptureSession> {
    let status: String = row.get("status");
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown session status '{}'", status)))?;

    let close_reason: Option<String> = row.get("close_reason");
    let close_reason = close_reason.as_deref().and_then(CloseReason::parse);

    let started_at: String = row.get("started_at");
    let last_seen_at: String = row.get("last_seen_at");
    let closed_at: Option<String> = row.get("closed_at");

    Ok(CaptureSession {
        guid: row.get("guid"),
        project_id: row.get("project_id"),
        status,
        sdk_identity: row.get("sdk_identity"),
        env: row.get("env"),
        started_at: parse_ts(&started_at, "started_at")?,
        last_seen_at: parse_ts(&last_seen_at, "last_seen_at")?,
        closed_at: closed_at.as_deref().map(|s| parse_ts(s, "closed_at")).transpose()?,
        close_reason,
    })
}

const SESSION_COLUMNS: &str =
    "guid, project_id, status, sdk_identity, env, started_at, last_seen_at, closed_at, close_reason";

pub async fn get(pool: &SqlitePool, session_id: &str) -> Result<Option<CaptureSession>> {
    let sql = format!(
        "SELECT {} FROM runtime_capture_sessions WHERE guid = ?",
        SESSION_COLUMNS
    );
    let row = sqlx::query(&sql).bind(session_id).fetch_optional(pool).await?;

    row.as_ref().map(session_from_row).transpose()
}

/// The currently active session for a project, if any. Most recent wins if
/// a concurrent-open race ever produced more than one.
pub async fn get_active(pool: &SqlitePool, project_id: &str) -> Result<Option<CaptureSession>> {
    let sql = format!(
        "SELECT {} FROM runtime_capture_sessions
         WHERE project_id = ? AND status = 'active'
         ORDER BY started_at DESC LIMIT 1",
        SESSION_COLUMNS
    );
    let row = sqlx::query(&sql).bind(project_id).fetch_optional(pool).await?;

    row.as_ref().map(session_from_row).transpose()
}

pub async fn insert(
    pool: &SqlitePool,
    project_id: &str,
    sdk_identity: &str,
    env: Option<&str>,
) -> Result<CaptureSession> {
    let guid = Uuid::new_v4().to_string();
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO runtime_capture_sessions
            (guid, project_id, status, sdk_identity, env, started_at, last_seen_at)
        VALUES (?, ?, 'active', ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(project_id)
    .bind(sdk_identity)
    .bind(env)
    .bind(&now_str)
    .bind(&now_str)
    .execute(pool)
    .await?;

    Ok(CaptureSession {
        guid,
        project_id: project_id.to_string(),
        status: SessionStatus::Active,
        sdk_identity: Some(sdk_identity.to_string()),
        env: env.map(str::to_string),
        started_at: now,
        last_seen_at: now,
        closed_at: None,
        close_reason: None,
    })
}

/// Refresh liveness (heartbeat or same-identity re-open).
pub async fn touch(pool: &SqlitePool, session_id: &str, env: Option<&str>) -> Result<()> {
    sqlx::query(
        "UPDATE runtime_capture_sessions
         SET last_seen_at = ?, env = COALESCE(?, env)
         WHERE guid = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(env)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Transition a session to a terminal state.
pub async fn finish(
    pool: &SqlitePool,
    session_id: &str,
    status: SessionStatus,
    reason: CloseReason,
) -> Result<()> {
    sqlx::query(
        "UPDATE runtime_capture_sessions
         SET status = ?, close_reason = ?, closed_at = ?
         WHERE guid = ?",
    )
    .bind(status.as_str())
    .bind(reason.as_str())
    .bind(Utc::now().to_rfc3339())
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Expire every active session for the project whose last heartbeat is
/// older than the cutoff. Returns rows expired. Runs lazily on access; the
/// system has no background scheduler.
pub async fn expire_stale(
    pool: &SqlitePool,
    project_id: &str,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE runtime_capture_sessions
         SET status = 'expired', close_reason = 'timeout', closed_at = ?
         WHERE project_id = ? AND status = 'active' AND last_seen_at < ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(project_id)
    .bind(cutoff.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
