//! Per-area database operations for the catalog
//!
//! Helpers that participate in multi-row mutations take a generic sqlx
//! executor so they run inside the reconciler's transaction as well as
//! directly on the pool.

pub mod aggregates;
pub mod entries;
pub mod placements;
pub mod projects;
pub mod sessions;
pub mod template;
pub mod tokens;
pub mod translations;

/// Current time in the canonical stored form (RFC3339, UTC offset).
///
/// Timestamps are always written explicitly in this format so that
/// lexicographic MAX() in SQL agrees with chronological order.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
