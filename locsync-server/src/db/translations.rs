//! Translation persistence

use locsync_common::db::models::TranslationStatus;
use locsync_common::Result;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

/// Create one pending/NULL Translation per configured target locale.
/// Runs inside the caller's transaction alongside Entry creation so an
/// Entry is never visible without its Translation set.
pub async fn create_pending_set(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry_id: &str,
    target_locales: &[String],
) -> Result<()> {
    let now = super::now_rfc3339();
    for locale in target_locales {
        sqlx::query(
            r#"
            INSERT INTO translations (guid, entry_id, locale, text, status, created_at, updated_at)
            VALUES (?, ?, ?, NULL, 'pending', ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry_id)
        .bind(locale)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Demote every approved translation of an entry to needs_update.
/// A source-text change invalidates prior approval. Returns rows demoted.
pub async fn demote_approved<'e, E>(exec: E, entry_id: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE translations SET status = 'needs_update', updated_at = ?
         WHERE entry_id = ? AND status = 'approved'",
    )
    .bind(super::now_rfc3339())
    .bind(entry_id)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

/// Write imported target text and mark it needs_review. Upsert handles
/// entries created before the locale was added to the project's targets.
pub async fn upsert_imported<'e, E>(exec: E, entry_id: &str, locale: &str, text: &str) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let now = super::now_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO translations (guid, entry_id, locale, text, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'needs_review', ?, ?)
        ON CONFLICT(entry_id, locale) DO UPDATE SET
            text = excluded.text,
            status = 'needs_review',
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entry_id)
    .bind(locale)
    .bind(text)
    .bind(&now)
    .bind(&now)
    .execute(exec)
    .await?;

    Ok(())
}

/// Translation text per entry guid for one locale across a project.
pub async fn texts_for_locale(
    pool: &sqlx::SqlitePool,
    project_id: &str,
    locale: &str,
) -> Result<HashMap<String, Option<String>>> {
    let rows = sqlx::query(
        r#"
        SELECT t.entry_id, t.text
        FROM translations t
        JOIN entries e ON e.guid = t.entry_id
        WHERE e.project_id = ? AND t.locale = ?
        "#,
    )
    .bind(project_id)
    .bind(locale)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("entry_id"), row.get("text")))
        .collect())
}

/// Status of one translation, for tests and editorial review surfaces.
pub async fn get_status(
    pool: &sqlx::SqlitePool,
    entry_id: &str,
    locale: &str,
) -> Result<Option<TranslationStatus>> {
    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM translations WHERE entry_id = ? AND locale = ?",
    )
    .bind(entry_id)
    .bind(locale)
    .fetch_optional(pool)
    .await?;

    Ok(status.and_then(|s| TranslationStatus::parse(&s)))
}

/// Force a status (editorial approval path; not reachable from imports).
pub async fn set_status(
    pool: &sqlx::SqlitePool,
    entry_id: &str,
    locale: &str,
    status: TranslationStatus,
) -> Result<()> {
    sqlx::query(
        "UPDATE translations SET status = ?, updated_at = ? WHERE entry_id = ? AND locale = ?",
    )
    .bind(status.as_str())
    .bind(super::now_rfc3339())
    .bind(entry_id)
    .bind(locale)
    .execute(pool)
    .await?;

    Ok(())
}

/// Latest translation update time across the requested locales.
pub async fn latest_updated_at(
    pool: &sqlx::SqlitePool,
    project_id: &str,
    locales: &[String],
) -> Result<Option<String>> {
    if locales.is_empty() {
        return Ok(None);
    }

    // Small bounded set of locales; build the placeholder list directly.
    let placeholders = vec!["?"; locales.len()].join(", ");
    let sql = format!(
        r#"
        SELECT MAX(t.updated_at)
        FROM translations t
        JOIN entries e ON e.guid = t.entry_id
        WHERE e.project_id = ? AND t.locale IN ({})
        "#,
        placeholders
    );

    let mut query = sqlx::query_scalar::<_, Option<String>>(&sql).bind(project_id);
    for locale in locales {
        query = query.bind(locale);
    }

    Ok(query.fetch_one(pool).await?)
}
