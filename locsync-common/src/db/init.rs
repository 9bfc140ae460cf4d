//! Database initialization
//!
//! Creates the catalog schema idempotently on startup. The uniqueness rules
//! that the reconciliation engine depends on live here: one Entry per
//! (project, key), one Translation per (entry, locale), one Placement per
//! (entry, module). "One active session per project" is deliberately NOT a
//! schema constraint; it is enforced by the session state machine.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes, and pragmas. Idempotent; also used directly
/// by tests against an in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer; capture ingest and
    // pulls overlap constantly.
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_settings_table(pool).await?;
    create_projects_table(pool).await?;
    create_entries_table(pool).await?;
    create_translations_table(pool).await?;
    create_pages_table(pool).await?;
    create_modules_table(pool).await?;
    create_placements_table(pool).await?;
    create_sessions_table(pool).await?;
    create_capture_events_table(pool).await?;
    create_capture_aggregates_table(pool).await?;
    create_template_items_table(pool).await?;
    create_runtime_tokens_table(pool).await?;

    Ok(())
}

/// Settings table: key-value store for generated secrets and tunables
async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            source_locale TEXT NOT NULL,
            target_locales TEXT NOT NULL DEFAULT '[]',
            shape TEXT NOT NULL DEFAULT 'flat' CHECK (shape IN ('flat', 'tree')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One Entry per (project, key). Entries are never deleted implicitly.
async fn create_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            key TEXT NOT NULL,
            source_text TEXT NOT NULL,
            source_locale TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_project ON entries(project_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_translations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            guid TEXT PRIMARY KEY,
            entry_id TEXT NOT NULL REFERENCES entries(guid) ON DELETE CASCADE,
            locale TEXT NOT NULL,
            text TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'needs_review', 'needs_update', 'approved')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (entry_id, locale)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_translations_entry ON translations(entry_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_translations_locale ON translations(locale)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Pages group modules by route within a project
async fn create_pages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            route TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, route)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Modules are organizational buckets under a page. The synthetic root
/// module (is_root = 1) is lazily created the first time a key is bound to
/// a page without an explicit module.
async fn create_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            guid TEXT PRIMARY KEY,
            page_id TEXT NOT NULL REFERENCES pages(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            is_root INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (page_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Composite primary key makes duplicate placement creation a structural
/// no-op via INSERT OR IGNORE; this is what makes diff-apply replayable.
async fn create_placements_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS placements (
            entry_id TEXT NOT NULL REFERENCES entries(guid) ON DELETE CASCADE,
            module_id TEXT NOT NULL REFERENCES modules(guid) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (entry_id, module_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_placements_module ON placements(module_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runtime_capture_sessions (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'closed', 'expired')),
            sdk_identity TEXT,
            env TEXT,
            started_at TIMESTAMP NOT NULL,
            last_seen_at TIMESTAMP NOT NULL,
            closed_at TIMESTAMP,
            close_reason TEXT
                CHECK (close_reason IS NULL OR close_reason IN ('saved', 'discarded', 'forced', 'timeout'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_project_status
         ON runtime_capture_sessions(project_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Raw per-event observations; kept for review, not scanned for existence
/// checks (that is what capture_aggregates is for).
async fn create_capture_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS capture_events (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            session_id TEXT REFERENCES runtime_capture_sessions(guid) ON DELETE SET NULL,
            route TEXT NOT NULL,
            key TEXT NOT NULL,
            source_text TEXT NOT NULL,
            occurred_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_capture_events_project
         ON capture_events(project_id, route, key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_capture_aggregates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS capture_aggregates (
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            route TEXT NOT NULL,
            key TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 1,
            last_seen_at TIMESTAMP NOT NULL,
            PRIMARY KEY (project_id, route, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Canonical export ordering; independent of Entry lifecycle
async fn create_template_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS language_pack_template_items (
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            key_path TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (project_id, key_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_template_items_position
         ON language_pack_template_items(project_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Token stored twice: keyed hash for verification, sealed for redisplay.
/// Never plaintext.
async fn create_runtime_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS project_runtime_tokens (
            project_id TEXT PRIMARY KEY REFERENCES projects(guid) ON DELETE CASCADE,
            token_hash TEXT NOT NULL,
            token_sealed TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            expires_at TIMESTAMP,
            last_used_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
