//! Capture session state machine
//!
//! At most one `active` session per project. This is a business rule, not a
//! schema constraint: every entry point re-checks after lazily expiring
//! stale sessions, and a losing concurrent opener is surfaced a conflict
//! rather than silently overwriting the winner's identity. A true race
//! between two opens is resolved last-writer-wins at the storage layer; the
//! extra terminal row is cleaned up by the same lazy sweep.
//!
//! State transitions: `active -> closed` (explicit close), `active ->
//! expired` (staleness timeout). Terminal states are final; closing a
//! terminal session returns its existing payload.

use crate::db::sessions;
use crate::error::{ApiError, ApiResult};
use crate::SessionWindows;
use chrono::{DateTime, Utc};
use locsync_common::db::models::{CaptureSession, CloseReason, SessionStatus};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

/// Session state as reported to SDK callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}

impl From<CaptureSession> for SessionPayload {
    fn from(s: CaptureSession) -> Self {
        Self {
            session_id: s.guid,
            status: s.status,
            sdk_identity: s.sdk_identity,
            env: s.env,
            started_at: s.started_at,
            last_seen_at: s.last_seen_at,
            closed_at: s.closed_at,
            close_reason: s.close_reason,
        }
    }
}

/// Expire stale active sessions for the project, then report. Runs before
/// any decision that depends on "is there an active session".
async fn sweep(db: &SqlitePool, windows: &SessionWindows, project_id: &str) -> ApiResult<()> {
    let cutoff = Utc::now() - windows.heartbeat_staleness;
    let expired = sessions::expire_stale(db, project_id, cutoff).await?;
    if expired > 0 {
        info!(project_id, expired, "Expired stale capture sessions");
    }
    Ok(())
}

/// Open a capture session, or refresh the caller's own active session.
///
/// A different SDK identity holding the active session is a conflict; the
/// response carries the blocking identity so the caller can report it.
pub async fn open(
    db: &SqlitePool,
    windows: &SessionWindows,
    project_id: &str,
    sdk_identity: &str,
    env: Option<&str>,
) -> ApiResult<SessionPayload> {
    sweep(db, windows, project_id).await?;

    match sessions::get_active(db, project_id).await? {
        None => {
            let session = sessions::insert(db, project_id, sdk_identity, env).await?;
            info!(project_id, session_id = %session.guid, "Opened capture session");
            Ok(session.into())
        }
        Some(existing) => {
            let same_identity = existing
                .sdk_identity
                .as_deref()
                .map(|recorded| recorded == sdk_identity)
                .unwrap_or(false);

            if same_identity {
                // Heartbeat-refresh: same writer re-opening its session
                sessions::touch(db, &existing.guid, env).await?;
                let refreshed = sessions::get(db, &existing.guid)
                    .await?
                    .ok_or_else(|| ApiError::Internal("session vanished mid-open".to_string()))?;
                Ok(refreshed.into())
            } else {
                Err(ApiError::SessionConflict {
                    blocking_identity: existing.sdk_identity,
                })
            }
        }
    }
}

/// Fetch a session scoped to the project, mapping absence to 404.
async fn get_scoped(
    db: &SqlitePool,
    project_id: &str,
    session_id: &str,
) -> ApiResult<CaptureSession> {
    let session = sessions::get(db, session_id)
        .await?
        .ok_or(ApiError::SessionNotFound)?;
    if session.project_id != project_id {
        return Err(ApiError::SessionNotFound);
    }
    Ok(session)
}

/// Reject callers whose identity does not match the session's recorded one.
/// A caller that presents no identity is accepted; possession of the
/// session id is its credential.
fn check_identity(session: &CaptureSession, caller: Option<&str>) -> ApiResult<()> {
    if let (Some(recorded), Some(caller)) = (session.sdk_identity.as_deref(), caller) {
        if recorded != caller {
            return Err(ApiError::SdkConflict(format!(
                "Session is held by a different SDK identity ({})",
                recorded
            )));
        }
    }
    Ok(())
}

/// Refresh session liveness.
pub async fn heartbeat(
    db: &SqlitePool,
    windows: &SessionWindows,
    project_id: &str,
    session_id: &str,
    sdk_identity: Option<&str>,
) -> ApiResult<SessionPayload> {
    sweep(db, windows, project_id).await?;

    let session = get_scoped(db, project_id, session_id).await?;
    if session.status != SessionStatus::Active {
        return Err(ApiError::SessionNotActive(format!(
            "Session is {}",
            session.status.as_str()
        )));
    }
    check_identity(&session, sdk_identity)?;

    sessions::touch(db, session_id, None).await?;
    let refreshed = get_scoped(db, project_id, session_id).await?;
    Ok(refreshed.into())
}

/// Close a session. Idempotent: a session already in a terminal state
/// returns its existing terminal payload unchanged.
pub async fn close(
    db: &SqlitePool,
    project_id: &str,
    session_id: &str,
    sdk_identity: Option<&str>,
    reason: CloseReason,
) -> ApiResult<SessionPayload> {
    let session = get_scoped(db, project_id, session_id).await?;

    if session.status.is_terminal() {
        return Ok(session.into());
    }
    check_identity(&session, sdk_identity)?;

    sessions::finish(db, session_id, SessionStatus::Closed, reason).await?;
    info!(project_id, session_id, reason = reason.as_str(), "Closed capture session");

    let closed = get_scoped(db, project_id, session_id).await?;
    Ok(closed.into())
}

/// Report current state, expiring first if the session went stale.
pub async fn status(
    db: &SqlitePool,
    windows: &SessionWindows,
    project_id: &str,
    session_id: &str,
) -> ApiResult<SessionPayload> {
    sweep(db, windows, project_id).await?;

    let session = get_scoped(db, project_id, session_id).await?;
    Ok(session.into())
}

/// Check that a session may still accept capture: it must be active and
/// inside the gate window measured from when it opened. The gate TTL is
/// independent of heartbeat staleness.
pub async fn check_capture_gate(
    db: &SqlitePool,
    windows: &SessionWindows,
    project_id: &str,
    session_id: &str,
) -> ApiResult<CaptureSession> {
    sweep(db, windows, project_id).await?;

    let session = get_scoped(db, project_id, session_id).await?;
    if session.status != SessionStatus::Active {
        return Err(ApiError::SessionNotActive(format!(
            "Session is {}",
            session.status.as_str()
        )));
    }
    if Utc::now() - session.started_at > windows.gate_ttl {
        return Err(ApiError::SessionNotActive(
            "Session gate window has elapsed".to_string(),
        ));
    }
    Ok(session)
}
