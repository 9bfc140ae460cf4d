//! Page, module, and placement persistence
//!
//! Pages and synthetic root modules use the create-or-fetch pattern:
//! INSERT OR IGNORE followed by a re-read, so concurrent binds racing to
//! create the same page/module converge on one row instead of erroring.

use locsync_common::{Error, Result};
use uuid::Uuid;

/// Name given to the synthetic root module of a page
const ROOT_MODULE_NAME: &str = "__root__";

/// Find or create the page for a route.
pub async fn create_or_fetch_page(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project_id: &str,
    route: &str,
) -> Result<String> {
    sqlx::query(
        "INSERT OR IGNORE INTO pages (guid, project_id, route, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(project_id)
    .bind(route)
    .bind(super::now_rfc3339())
    .execute(&mut **tx)
    .await?;

    let guid: String =
        sqlx::query_scalar("SELECT guid FROM pages WHERE project_id = ? AND route = ?")
            .bind(project_id)
            .bind(route)
            .fetch_one(&mut **tx)
            .await?;

    Ok(guid)
}

/// Find or create the synthetic root module of a page.
pub async fn create_or_fetch_root_module(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    page_id: &str,
) -> Result<String> {
    sqlx::query(
        "INSERT OR IGNORE INTO modules (guid, page_id, name, is_root, created_at)
         VALUES (?, ?, ?, 1, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(page_id)
    .bind(ROOT_MODULE_NAME)
    .bind(super::now_rfc3339())
    .execute(&mut **tx)
    .await?;

    let guid: String =
        sqlx::query_scalar("SELECT guid FROM modules WHERE page_id = ? AND name = ?")
            .bind(page_id)
            .bind(ROOT_MODULE_NAME)
            .fetch_one(&mut **tx)
            .await?;

    Ok(guid)
}

/// Verify an explicitly supplied module id belongs to this project.
pub async fn module_in_project(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project_id: &str,
    module_id: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM modules m
        JOIN pages p ON p.guid = m.page_id
        WHERE m.guid = ? AND p.project_id = ?
        "#,
    )
    .bind(module_id)
    .bind(project_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(count > 0)
}

/// Create a placement. Duplicate (entry, module) pairs are swallowed, which
/// is what makes an identical apply batch replayable.
pub async fn create_placement(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry_id: &str,
    module_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO placements (entry_id, module_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(entry_id)
    .bind(module_id)
    .bind(super::now_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Remove one specific placement. The Entry itself always survives; it may
/// still be bound elsewhere.
pub async fn delete_placement(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry_id: &str,
    module_id: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM placements WHERE entry_id = ? AND module_id = ?")
        .bind(entry_id)
        .bind(module_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

/// All (entry_id, module_id) placements for a project, for review surfaces
/// and tests.
pub async fn list_for_project(
    pool: &sqlx::SqlitePool,
    project_id: &str,
) -> Result<Vec<(String, String)>> {
    use sqlx::Row;

    let rows = sqlx::query(
        r#"
        SELECT pl.entry_id, pl.module_id
        FROM placements pl
        JOIN entries e ON e.guid = pl.entry_id
        WHERE e.project_id = ?
        ORDER BY pl.entry_id, pl.module_id
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("entry_id"), row.get("module_id")))
        .collect())
}

/// Resolve a module id from the operation's explicit target, falling back
/// to the route page's synthetic root module.
pub async fn resolve_target_module(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project_id: &str,
    route: &str,
    target_page_id: Option<&str>,
    target_module_id: Option<&str>,
) -> Result<String> {
    if let Some(module_id) = target_module_id {
        if !module_in_project(tx, project_id, module_id).await? {
            return Err(Error::NotFound(format!(
                "Module {} not found in project",
                module_id
            )));
        }
        return Ok(module_id.to_string());
    }

    let page_id = match target_page_id {
        Some(page_id) => page_id.to_string(),
        None => create_or_fetch_page(tx, project_id, route).await?,
    };

    create_or_fetch_root_module(tx, &page_id).await
}
