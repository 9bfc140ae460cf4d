//! Language-pack imports
//!
//! Source imports may create entries and demote approvals; target imports
//! may only fill existing entries, never create them, and their output is
//! never auto-approved.

use crate::db::{entries, projects, template, translations};
use crate::error::{ApiError, ApiResult};
use locsync_common::db::models::Project;
use locsync_common::keypath::{flatten_document, FlattenedDocument};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

/// Result counts for a source-locale import
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceImportReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_non_string: usize,
    /// Approved translations demoted to needs_update by source changes
    pub translations_marked_needs_update: usize,
}

/// Result counts for a target-locale import
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetImportReport {
    pub updated: usize,
    pub ignored: usize,
    pub skipped_empty: usize,
    pub skipped_non_string: usize,
}

fn flatten_or_reject(document: &Value) -> ApiResult<FlattenedDocument> {
    flatten_document(document)
        .ok_or_else(|| ApiError::invalid("document", "must be a JSON object"))
}

/// Import a language pack into the source locale.
///
/// The imported document is the canonical statement of desired layout: its
/// key order replaces the project's template items and its shape (flat or
/// nested) becomes the project's export shape.
pub async fn import_source(
    db: &SqlitePool,
    project: &Project,
    document: &Value,
) -> ApiResult<SourceImportReport> {
    let flat = flatten_or_reject(document)?;

    let mut report = SourceImportReport {
        added: 0,
        updated: 0,
        unchanged: 0,
        skipped_non_string: flat.skipped_non_string,
        translations_marked_needs_update: 0,
    };

    let mut tx = db.begin().await?;

    for (key, text) in &flat.pairs {
        match entries::get_by_key(&mut *tx, &project.guid, key).await? {
            None => {
                let entry_id = entries::create(
                    &mut *tx,
                    &project.guid,
                    key,
                    text,
                    &project.source_locale,
                )
                .await?;
                translations::create_pending_set(&mut tx, &entry_id, &project.target_locales)
                    .await?;
                report.added += 1;
            }
            Some(entry) if entry.source_text != *text => {
                entries::update_source_text(&mut *tx, &entry.guid, text).await?;
                // A source change invalidates prior approval
                let demoted = translations::demote_approved(&mut *tx, &entry.guid).await?;
                report.translations_marked_needs_update += demoted as usize;
                report.updated += 1;
            }
            Some(_) => report.unchanged += 1,
        }
    }

    let keys: Vec<String> = flat.pairs.iter().map(|(k, _)| k.clone()).collect();
    template::replace_items(&mut tx, &project.guid, &keys).await?;
    projects::set_shape(&mut *tx, &project.guid, flat.shape).await?;

    tx.commit().await?;

    info!(
        project_id = %project.guid,
        added = report.added,
        updated = report.updated,
        unchanged = report.unchanged,
        "Source language pack imported"
    );

    Ok(report)
}

/// Import a language pack into one target locale.
///
/// Blank text never overwrites an existing translation, unknown keys are
/// counted as ignored (target packs cannot create entries), and everything
/// written lands in needs_review.
pub async fn import_target(
    db: &SqlitePool,
    project: &Project,
    locale: &str,
    document: &Value,
) -> ApiResult<TargetImportReport> {
    if !project.target_locales.iter().any(|l| l == locale) {
        return Err(ApiError::NotFound(format!(
            "Locale '{}' is not a configured target of this project",
            locale
        )));
    }

    let flat = flatten_or_reject(document)?;

    let mut report = TargetImportReport {
        updated: 0,
        ignored: 0,
        skipped_empty: 0,
        skipped_non_string: flat.skipped_non_string,
    };

    let mut tx = db.begin().await?;

    for (key, text) in &flat.pairs {
        if text.trim().is_empty() {
            report.skipped_empty += 1;
            continue;
        }

        match entries::get_by_key(&mut *tx, &project.guid, key).await? {
            None => report.ignored += 1,
            Some(entry) => {
                translations::upsert_imported(&mut *tx, &entry.guid, locale, text).await?;
                report.updated += 1;
            }
        }
    }

    tx.commit().await?;

    info!(
        project_id = %project.guid,
        locale,
        updated = report.updated,
        ignored = report.ignored,
        skipped_empty = report.skipped_empty,
        "Target language pack imported"
    );

    Ok(report)
}
