//! Database models for the localization catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Translation workflow status. Derived state: never freely settable by
/// import (source changes demote, target imports land in needs_review).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    NeedsReview,
    NeedsUpdate,
    Approved,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::NeedsReview => "needs_review",
            TranslationStatus::NeedsUpdate => "needs_update",
            TranslationStatus::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TranslationStatus::Pending),
            "needs_review" => Some(TranslationStatus::NeedsReview),
            "needs_update" => Some(TranslationStatus::NeedsUpdate),
            "approved" => Some(TranslationStatus::Approved),
            _ => None,
        }
    }
}

/// Runtime capture session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "closed" => Some(SessionStatus::Closed),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Expired)
    }
}

/// Why a capture session reached a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Saved,
    Discarded,
    Forced,
    Timeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Saved => "saved",
            CloseReason::Discarded => "discarded",
            CloseReason::Forced => "forced",
            CloseReason::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "saved" => Some(CloseReason::Saved),
            "discarded" => Some(CloseReason::Discarded),
            "forced" => Some(CloseReason::Forced),
            "timeout" => Some(CloseReason::Timeout),
            _ => None,
        }
    }
}

/// A project: the unit of catalog isolation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub guid: String,
    pub name: String,
    pub slug: String,
    pub source_locale: String,
    /// Configured target locales (stored as a JSON array)
    pub target_locales: Vec<String>,
    /// Export shape recorded from the last source import
    pub shape: crate::keypath::DocumentShape,
}

/// Canonical source-language record for one translation key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub guid: String,
    pub project_id: String,
    pub key: String,
    pub source_text: String,
    pub source_locale: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-locale text and workflow status for one Entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub guid: String,
    pub entry_id: String,
    pub locale: String,
    pub text: Option<String>,
    pub status: TranslationStatus,
    pub updated_at: DateTime<Utc>,
}

/// One bounded window of SDK-driven observation for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSession {
    pub guid: String,
    pub project_id: String,
    pub status: SessionStatus,
    pub sdk_identity: Option<String>,
    pub env: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

/// Rolling (route, key) observation counter; answers "already seen" in O(1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureAggregate {
    pub project_id: String,
    pub route: String,
    pub key: String,
    pub count: i64,
    pub last_seen_at: DateTime<Utc>,
}

/// Stored runtime token record: hash for verification, sealed for redisplay
#[derive(Debug, Clone)]
pub struct RuntimeToken {
    pub project_id: String,
    pub token_hash: String,
    pub token_sealed: String,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}
