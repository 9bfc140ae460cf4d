//! Capture aggregate persistence
//!
//! The rolling (project, route, key) counter answers "has this key already
//! been seen on this route" in O(1) without rescanning raw capture events.

use locsync_common::db::models::CaptureAggregate;
use locsync_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

/// Record one raw observation and bump its aggregate counter.
pub async fn record_observation(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project_id: &str,
    session_id: Option<&str>,
    route: &str,
    key: &str,
    source_text: &str,
    occurred_at: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO capture_events (guid, project_id, session_id, route, key, source_text, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id)
    .bind(session_id)
    .bind(route)
    .bind(key)
    .bind(source_text)
    .bind(occurred_at)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO capture_aggregates (project_id, route, key, count, last_seen_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(project_id, route, key) DO UPDATE SET
            count = count + 1,
            last_seen_at = excluded.last_seen_at
        "#,
    )
    .bind(project_id)
    .bind(route)
    .bind(key)
    .bind(super::now_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Fetch one aggregate row, mainly for review surfaces and tests.
pub async fn get(
    pool: &sqlx::SqlitePool,
    project_id: &str,
    route: &str,
    key: &str,
) -> Result<Option<CaptureAggregate>> {
    let row = sqlx::query(
        "SELECT project_id, route, key, count, last_seen_at
         FROM capture_aggregates
         WHERE project_id = ? AND route = ? AND key = ?",
    )
    .bind(project_id)
    .bind(route)
    .bind(key)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let last_seen_at: String = row.get("last_seen_at");
            let last_seen_at = chrono::DateTime::parse_from_rfc3339(&last_seen_at)
                .map_err(|e| Error::Internal(format!("Failed to parse last_seen_at: {}", e)))?
                .with_timezone(&chrono::Utc);

            Ok(Some(CaptureAggregate {
                project_id: row.get("project_id"),
                route: row.get("route"),
                key: row.get("key"),
                count: row.get("count"),
                last_seen_at,
            }))
        }
        None => Ok(None),
    }
}
