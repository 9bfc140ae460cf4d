//! Diff-apply reconciler
//!
//! Applies operator-approved decisions over classified diffs to the catalog
//! in one all-or-nothing transaction. Replaying an identical batch reaches
//! the identical final state: entries are resolve-or-create, placements are
//! INSERT OR IGNORE, and placement deletes of already-absent rows are
//! no-ops. The apply id is logged and echoed for tracing but carries no
//! replay detection; idempotency is structural.

use crate::db::{entries, placements, translations};
use crate::error::{ApiError, ApiResult, FieldError};
use locsync_common::db::models::Project;
use locsync_common::Error as CommonError;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

/// Diff classification kind the operator reviewed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NewKey,
    TextChanged,
    Move,
    Stale,
}

/// Operator decision for one diff row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Bind,
    Delete,
    Ignore,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOperation {
    pub kind: OperationKind,
    pub action: ApplyAction,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub current_module_id: Option<String>,
    #[serde(default)]
    pub target_page_id: Option<String>,
    #[serde(default)]
    pub target_module_id: Option<String>,
}

/// Per-kind counts returned to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub apply_id: String,
    pub bound: usize,
    pub moved: usize,
    pub removed: usize,
    pub ignored: usize,
}

/// Field-level validation of the operation set, done before the transaction
/// opens so a malformed batch never touches the catalog.
fn validate(operations: &[ApplyOperation]) -> ApiResult<()> {
    let mut errors = Vec::new();

    for (i, op) in operations.iter().enumerate() {
        match op.action {
            ApplyAction::Bind => {
                if op.key.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    errors.push(FieldError::new(
                        format!("operations[{}].key", i),
                        "required for bind",
                    ));
                }
            }
            ApplyAction::Delete => {
                if op.entry_id.as_deref().unwrap_or("").is_empty() {
                    errors.push(FieldError::new(
                        format!("operations[{}].entryId", i),
                        "required for delete",
                    ));
                }
                if op.current_module_id.as_deref().unwrap_or("").is_empty() {
                    errors.push(FieldError::new(
                        format!("operations[{}].currentModuleId", i),
                        "required for delete",
                    ));
                }
            }
            ApplyAction::Ignore => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Apply an approved operation set atomically.
pub async fn apply(
    db: &SqlitePool,
    project: &Project,
    apply_id: &str,
    route: &str,
    operations: &[ApplyOperation],
) -> ApiResult<ApplyReport> {
    validate(operations)?;

    let ignored = operations
        .iter()
        .filter(|op| op.action == ApplyAction::Ignore)
        .count();

    let mut report = ApplyReport {
        apply_id: apply_id.to_string(),
        bound: 0,
        moved: 0,
        removed: 0,
        ignored,
    };

    let mut tx = db.begin().await?;

    for op in operations.iter().filter(|op| op.action != ApplyAction::Ignore) {
        match op.action {
            ApplyAction::Bind => {
                let key = op.key.as_deref().unwrap_or_default().trim();

                // Resolve-or-create the entry. The placeholder keeps a bound
                // key usable before any real source text has been supplied.
                let entry_id = match entries::get_by_key(&mut *tx, &project.guid, key).await? {
                    Some(entry) => entry.guid,
                    None => {
                        let text = op
                            .source_text
                            .as_deref()
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .unwrap_or(key);
                        let entry_id = entries::create(
                            &mut *tx,
                            &project.guid,
                            key,
                            text,
                            &project.source_locale,
                        )
                        .await?;
                        translations::create_pending_set(
                            &mut tx,
                            &entry_id,
                            &project.target_locales,
                        )
                        .await?;
                        entry_id
                    }
                };

                let module_id = placements::resolve_target_module(
                    &mut tx,
                    &project.guid,
                    route,
                    op.target_page_id.as_deref(),
                    op.target_module_id.as_deref(),
                )
                .await
                .map_err(|e| match e {
                    CommonError::NotFound(msg) => ApiError::NotFound(msg),
                    other => other.into(),
                })?;

                let is_move = op.kind == OperationKind::Move && op.current_module_id.is_some();
                if let (true, Some(current)) = (is_move, op.current_module_id.as_deref()) {
                    placements::delete_placement(&mut tx, &entry_id, current).await?;
                }

                placements::create_placement(&mut tx, &entry_id, &module_id).await?;

                if is_move {
                    report.moved += 1;
                } else {
                    report.bound += 1;
                }
            }
            ApplyAction::Delete => {
                let entry_id = op.entry_id.as_deref().unwrap_or_default();
                let module_id = op.current_module_id.as_deref().unwrap_or_default();
                placements::delete_placement(&mut tx, entry_id, module_id).await?;
                report.removed += 1;
            }
            ApplyAction::Ignore => unreachable!("filtered above"),
        }
    }

    tx.commit().await?;

    info!(
        apply_id,
        project_id = %project.guid,
        bound = report.bound,
        moved = report.moved,
        removed = report.removed,
        ignored = report.ignored,
        "Applied diff operations"
    );

    Ok(report)
}
