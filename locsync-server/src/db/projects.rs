//! Project persistence

use locsync_common::db::models::Project;
use locsync_common::keypath::DocumentShape;
use locsync_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project> {
    let target_locales: String = row.get("target_locales");
    let target_locales: Vec<String> = serde_json::from_str(&target_locales)
        .map_err(|e| Error::Internal(format!("Failed to parse target_locales: {}", e)))?;

    let shape: String = row.get("shape");
    let shape = DocumentShape::parse(&shape)
        .ok_or_else(|| Error::Internal(format!("Unknown document shape '{}'", shape)))?;

    Ok(Project {
        guid: row.get("guid"),
        name: row.get("name"),
        slug: row.get("slug"),
        source_locale: row.get("source_locale"),
        target_locales,
        shape,
    })
}

pub async fn get_project(pool: &SqlitePool, guid: &str) -> Result<Option<Project>> {
    let row = sqlx::query(
        "SELECT guid, name, slug, source_locale, target_locales, shape
         FROM projects WHERE guid = ?",
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(project_from_row).transpose()
}

pub async fn create_project(
    pool: &SqlitePool,
    name: &str,
    slug: &str,
    source_locale: &str,
    target_locales: &[String],
) -> Result<Project> {
    let guid = Uuid::new_v4().to_string();
    let locales_json = serde_json::to_string(target_locales)
        .map_err(|e| Error::Internal(format!("Failed to serialize target_locales: {}", e)))?;
    let now = super::now_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO projects (guid, name, slug, source_locale, target_locales, shape, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'flat', ?, ?)
        "#,
    )
    .bind(&guid)
    .bind(name)
    .bind(slug)
    .bind(source_locale)
    .bind(&locales_json)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(Project {
        guid,
        name: name.to_string(),
        slug: slug.to_string(),
        source_locale: source_locale.to_string(),
        target_locales: target_locales.to_vec(),
        shape: DocumentShape::Flat,
    })
}

/// Record the shape observed by the most recent source import.
pub async fn set_shape<'e, E>(exec: E, project_id: &str, shape: DocumentShape) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query("UPDATE projects SET shape = ?, updated_at = ? WHERE guid = ?")
        .bind(shape.as_str())
        .bind(super::now_rfc3339())
        .bind(project_id)
        .execute(exec)
        .await?;

    Ok(())
}
