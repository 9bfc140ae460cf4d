//! Entry persistence
//!
//! Entries are the canonical source-language records; one per (project,
//! key), created on first observation or import, never deleted implicitly.

use chrono::{DateTime, Utc};
use locsync_common::db::models::Entry;
use locsync_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Entry> {
    let updated_at: String = row.get("updated_at");
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Entry {
        guid: row.get("guid"),
        project_id: row.get("project_id"),
        key: row.get("key"),
        source_text: row.get("source_text"),
        source_locale: row.get("source_locale"),
        updated_at,
    })
}

pub async fn get_by_key<'e, E>(exec: E, project_id: &str, key: &str) -> Result<Option<Entry>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT guid, project_id, key, source_text, source_locale, updated_at
         FROM entries WHERE project_id = ? AND key = ?",
    )
    .bind(project_id)
    .bind(key)
    .fetch_optional(exec)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Insert a new Entry. The caller is responsible for creating the pending
/// Translation set in the same transaction.
pub async fn create<'e, E>(
    exec: E,
    project_id: &str,
    key: &str,
    source_text: &str,
    source_locale: &str,
) -> Result<String>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let guid = Uuid::new_v4().to_string();
    let now = super::now_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO entries (guid, project_id, key, source_text, source_locale, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(project_id)
    .bind(key)
    .bind(source_text)
    .bind(source_locale)
    .bind(&now)
    .bind(&now)
    .execute(exec)
    .await?;

    Ok(guid)
}

pub async fn update_source_text<'e, E>(exec: E, entry_id: &str, source_text: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("UPDATE entries SET source_text = ?, updated_at = ? WHERE guid = ?")
        .bind(source_text)
        .bind(super::now_rfc3339())
        .bind(entry_id)
        .execute(exec)
        .await?;

    Ok(())
}

/// All entries for a project as (key, guid, source_text), ordered by key.
pub async fn list_for_project(
    pool: &sqlx::SqlitePool,
    project_id: &str,
) -> Result<Vec<(String, String, String)>> {
    let rows = sqlx::query(
        "SELECT key, guid, source_text FROM entries WHERE project_id = ? ORDER BY key",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("key"), row.get("guid"), row.get("source_text")))
        .collect())
}

/// Latest entry update time for the project, as stored RFC3339 text.
pub async fn latest_updated_at(
    pool: &sqlx::SqlitePool,
    project_id: &str,
) -> Result<Option<String>> {
    let max: Option<String> =
        sqlx::query_scalar("SELECT MAX(updated_at) FROM entries WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(pool)
            .await?;

    Ok(max)
}
