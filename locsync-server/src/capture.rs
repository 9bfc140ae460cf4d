//! Capture ingestion and diff classification
//!
//! Observations are labeled against the catalog but never mutate it; the
//! catalog only changes when an operator approves the resulting diff and
//! the reconciler applies it (`crate::reconcile`).

use crate::db::{aggregates, entries};
use crate::error::ApiResult;
use crate::{session, SessionWindows};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// One observed (route, key, text) event from the runtime SDK
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub route: String,
    pub key: String,
    pub source_text: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Labeling of an observation relative to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    NewKey,
    TextChanged,
    None,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedObservation {
    pub route: String,
    pub key: String,
    pub classification: Classification,
}

/// Counts-based ingestion result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub total: usize,
    pub new_keys: usize,
    pub text_changed: usize,
    pub unchanged: usize,
    pub observations: Vec<ClassifiedObservation>,
}

/// Classify observed text against the stored entry. Comparison is on
/// trimmed text; rendering whitespace jitter is not a content change.
pub fn classify(stored_source_text: Option<&str>, observed_text: &str) -> Classification {
    match stored_source_text {
        None => Classification::NewKey,
        Some(stored) => {
            if stored.trim() != observed_text.trim() {
                Classification::TextChanged
            } else {
                Classification::None
            }
        }
    }
}

/// Ingest a batch of observations: classify each against the catalog,
/// persist the raw events, and bump the rolling aggregates. When a session
/// id is supplied, the session must be active and inside its gate window.
pub async fn ingest(
    db: &SqlitePool,
    windows: &SessionWindows,
    project_id: &str,
    session_id: Option<&str>,
    observations: &[Observation],
) -> ApiResult<CaptureReport> {
    if let Some(session_id) = session_id {
        session::check_capture_gate(db, windows, project_id, session_id).await?;
    }

    let mut report = CaptureReport {
        session_id: session_id.map(str::to_string),
        total: observations.len(),
        new_keys: 0,
        text_changed: 0,
        unchanged: 0,
        observations: Vec::with_capacity(observations.len()),
    };

    let mut tx = db.begin().await?;

    for obs in observations {
        let entry = entries::get_by_key(&mut *tx, project_id, &obs.key).await?;
        let classification = classify(entry.as_ref().map(|e| e.source_text.as_str()), &obs.source_text);

        match classification {
            Classification::NewKey => report.new_keys += 1,
            Classification::TextChanged => report.text_changed += 1,
            Classification::None => report.unchanged += 1,
        }

        let occurred_at = obs.occurred_at.unwrap_or_else(Utc::now).to_rfc3339();
        aggregates::record_observation(
            &mut tx,
            project_id,
            session_id,
            &obs.route,
            &obs.key,
            &obs.source_text,
            &occurred_at,
        )
        .await?;

        report.observations.push(ClassifiedObservation {
            route: obs.route.clone(),
            key: obs.key.clone(),
            classification,
        });
    }

    tx.commit().await?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_is_new_key() {
        assert_eq!(classify(None, "Sign in"), Classification::NewKey);
    }

    #[test]
    fn differing_text_is_changed() {
        assert_eq!(
            classify(Some("Sign in"), "Log in"),
            Classification::TextChanged
        );
    }

    #[test]
    fn identical_text_is_none() {
        assert_eq!(classify(Some("Sign in"), "Sign in"), Classification::None);
    }

    #[test]
    fn comparison_trims_whitespace() {
        assert_eq!(classify(Some("Sign in "), "  Sign in"), Classification::None);
        assert_eq!(
            classify(Some(" Sign in "), "Sign-in"),
            Classification::TextChanged
        );
    }
}
