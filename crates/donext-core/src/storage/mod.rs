//! Storage adapter boundary.
//!
//! The core owns no persistent state. Each handler reads what it needs once
//! at the start of a pass and writes once at the end; writes are best-effort
//! and a failed write never changes the response.

mod memory;
pub mod migrations;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

use crate::agents::SelectionOutcome;
use crate::checkin::RawCheckin;
use crate::error::{ConfigError, StorageError};
use crate::events::EventKind;
use crate::gamification::GamificationState;
use crate::stuck::TaskActivity;
use crate::task::WorkItemCandidate;

/// Read/write contract the core needs from its environment.
///
/// Implementations must be safe to share across tasks; the host serializes
/// events per user, so no cross-call ordering is assumed here.
pub trait StorageAdapter: Send + Sync {
    /// Outstanding items for the user. Never includes completed or cancelled
    /// items. Returns [`StorageError::UnknownUser`] if the user does not exist.
    fn fetch_candidates(&self, user_id: &str) -> Result<Vec<WorkItemCandidate>, StorageError>;

    /// The check-in the user submitted on `date`, if any.
    fn fetch_today_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<RawCheckin>, StorageError>;

    fn fetch_gamification_state(
        &self,
        user_id: &str,
    ) -> Result<Option<GamificationState>, StorageError>;

    /// Activity on `task_id`, counting only events at or after `since`.
    fn fetch_task_activity(
        &self,
        user_id: &str,
        task_id: &str,
        since: DateTime<Utc>,
    ) -> Result<TaskActivity, StorageError>;

    /// Replace the user's active selection.
    fn persist_active_selection(
        &self,
        user_id: &str,
        selection: &SelectionOutcome,
    ) -> Result<(), StorageError>;

    /// Drop the user's active selection, e.g. once nothing is left to do.
    fn clear_active_selection(&self, user_id: &str) -> Result<(), StorageError>;

    fn persist_gamification_state(
        &self,
        user_id: &str,
        state: &GamificationState,
    ) -> Result<(), StorageError>;

    /// Append one observability record. `payload` carries the event's own
    /// fields (`timestamp`, and for `DO_ACTION` also `task_id`/`action`).
    fn append_event_log(
        &self,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError>;
}

/// Returns `~/.config/donext[-dev]/` based on DONEXT_ENV.
///
/// Set DONEXT_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DONEXT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("donext-dev")
    } else {
        base_dir.join("donext")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Timestamp recorded for a log payload: its own `timestamp`, else now.
pub(crate) fn payload_time(payload: &serde_json::Value) -> DateTime<Utc> {
    payload
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now)
}
