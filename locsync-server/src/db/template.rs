//! Language-pack template item persistence
//!
//! The template records the canonical export ordering captured from the
//! last source import. It is replaced wholesale, never merged.

use locsync_common::Result;

/// Replace the project's template with the given key order.
pub async fn replace_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    project_id: &str,
    keys: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM language_pack_template_items WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut **tx)
        .await?;

    for (position, key) in keys.iter().enumerate() {
        sqlx::query(
            "INSERT INTO language_pack_template_items (project_id, key_path, position)
             VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(key)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Template key paths in recorded position order.
pub async fn list_ordered(pool: &sqlx::SqlitePool, project_id: &str) -> Result<Vec<String>> {
    let keys: Vec<String> = sqlx::query_scalar(
        "SELECT key_path FROM language_pack_template_items
         WHERE project_id = ? ORDER BY position",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}
