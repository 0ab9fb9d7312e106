//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - Users and their outstanding work items
//! - Daily check-ins
//! - The active selection and progression state per user
//! - The append-only event log (stuck detection reads it back)

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, migrations, payload_time, StorageAdapter};
use crate::agents::SelectionOutcome;
use crate::checkin::RawCheckin;
use crate::error::StorageError;
use crate::events::EventKind;
use crate::gamification::GamificationState;
use crate::stuck::{ActionRecord, TaskActivity};
use crate::task::{CandidateStatus, PriorityTier, WorkItemCandidate};

/// SQLite database implementing [`StorageAdapter`].
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

fn write_err(e: rusqlite::Error) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok()
}

impl SqliteStorage {
    /// Open the database at `~/.config/donext/donext.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open_default() -> Result<Self, StorageError> {
        let dir = data_dir().map_err(|e| StorageError::OpenFailed {
            path: "~/.config/donext".into(),
            message: e.to_string(),
        })?;
        Self::open(&dir.join("donext.db"))
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_connection(conn)
    }

    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::OpenFailed {
            path: ":memory:".into(),
            message: e.to_string(),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::ReadFailed("connection lock poisoned".into()))
    }

    /// Create the user if missing.
    pub fn register_user(&self, user_id: &str) -> Result<(), StorageError> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
                params![user_id, Utc::now().to_rfc3339()],
            )
            .map_err(write_err)?;
        Ok(())
    }

    /// Insert or replace a work item; registers the user as a side effect.
    pub fn upsert_candidate(
        &self,
        user_id: &str,
        candidate: &WorkItemCandidate,
    ) -> Result<(), StorageError> {
        self.register_user(user_id)?;
        let tags = serde_json::to_string(&candidate.tags)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO candidates
                 (user_id, id, title, priority, status, estimated_minutes, due_at, tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user_id,
                    candidate.id,
                    candidate.title,
                    candidate.priority.as_str(),
                    candidate.status.as_str(),
                    candidate.estimated_minutes,
                    candidate.due_at.map(|d| d.to_rfc3339()),
                    tags,
                    candidate.created_at.to_rfc3339(),
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    /// Returns true if the item existed.
    pub fn set_candidate_status(
        &self,
        user_id: &str,
        candidate_id: &str,
        status: CandidateStatus,
    ) -> Result<bool, StorageError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE candidates SET status = ?1 WHERE user_id = ?2 AND id = ?3",
                params![status.as_str(), user_id, candidate_id],
            )
            .map_err(write_err)?;
        Ok(changed > 0)
    }

    /// Store the check-in for the user's local `date`, replacing any earlier one.
    pub fn save_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
        checkin: &RawCheckin,
    ) -> Result<(), StorageError> {
        self.register_user(user_id)?;
        let payload =
            serde_json::to_string(checkin).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO checkins (user_id, date, payload) VALUES (?1, ?2, ?3)",
                params![user_id, date.to_string(), payload],
            )
            .map_err(write_err)?;
        Ok(())
    }

    pub fn active_selection(&self, user_id: &str) -> Result<Option<SelectionOutcome>, StorageError> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM active_selections WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    /// Number of log entries for the user.
    pub fn event_count(&self, user_id: &str) -> Result<u64, StorageError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM event_log WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl StorageAdapter for SqliteStorage {
    fn fetch_candidates(&self, user_id: &str) -> Result<Vec<WorkItemCandidate>, StorageError> {
        let conn = self.conn()?;
        let known: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(StorageError::UnknownUser(user_id.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT id, title, priority, status, estimated_minutes, due_at, tags, created_at
             FROM candidates
             WHERE user_id = ?1 AND status NOT IN ('completed', 'cancelled')
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id, title, priority, status, minutes, due_at, tags, created_at) = row?;
            let Some(created_at) = parse_time(&created_at) else {
                tracing::warn!(candidate_id = %id, "skipping candidate with unreadable created_at");
                continue;
            };
            candidates.push(WorkItemCandidate {
                id,
                title,
                priority: PriorityTier::parse(&priority).unwrap_or_default(),
                status: CandidateStatus::parse(&status).unwrap_or_default(),
                estimated_minutes: minutes.clamp(0, u32::MAX as i64) as u32,
                due_at: due_at.as_deref().and_then(parse_time),
                tags: serde_json::from_str(&tags).unwrap_or_default(),
                created_at,
            });
        }
        Ok(candidates)
    }

    fn fetch_today_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<RawCheckin>, StorageError> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM checkins WHERE user_id = ?1 AND date = ?2",
                params![user_id, date.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn fetch_gamification_state(
        &self,
        user_id: &str,
    ) -> Result<Option<GamificationState>, StorageError> {
        let payload: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM gamification WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| StorageError::ReadFailed(e.to_string()))
    }

    fn fetch_task_activity(
        &self,
        user_id: &str,
        task_id: &str,
        since: DateTime<Utc>,
    ) -> Result<TaskActivity, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, action, at FROM event_log
             WHERE user_id = ?1 AND task_id = ?2 AND kind = ?3 AND action IS NOT NULL",
        )?;
        let rows = stmt.query_map(
            params![user_id, task_id, EventKind::DoAction.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (task_id, action, at) = row?;
            if let Some(at) = parse_time(&at) {
                records.push(ActionRecord { task_id, action, at });
            }
        }
        Ok(TaskActivity::from_records(&records, task_id, since))
    }

    fn persist_active_selection(
        &self,
        user_id: &str,
        selection: &SelectionOutcome,
    ) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(selection).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO active_selections (user_id, chosen_id, payload, selected_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    selection.chosen_id,
                    payload,
                    selection.selected_at.to_rfc3339()
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }

    fn clear_active_selection(&self, user_id: &str) -> Result<(), StorageError> {
        self.conn()?
            .execute(
                "DELETE FROM active_selections WHERE user_id = ?1",
                params![user_id],
            )
            .map_err(write_err)?;
        Ok(())
    }

    fn persist_gamification_state(
        &self,
        user_id: &str,
        state: &GamificationState,
    ) -> Result<(), StorageError> {
        let payload =
            serde_json::to_string(state).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO gamification (user_id, payload) VALUES (?1, ?2)",
                params![user_id, payload],
            )
            .map_err(write_err)?;
        Ok(())
    }

    fn append_event_log(
        &self,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let record = ActionRecord::from_payload(payload);
        let body =
            serde_json::to_string(payload).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.conn()?
            .execute(
                "INSERT INTO event_log (user_id, kind, task_id, action, at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user_id,
                    kind.as_str(),
                    record.as_ref().map(|r| r.task_id.clone()),
                    record.as_ref().map(|r| r.action.clone()),
                    payload_time(payload).to_rfc3339(),
                    body,
                ],
            )
            .map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn item(id: &str, status: CandidateStatus) -> WorkItemCandidate {
        WorkItemCandidate {
            id: id.into(),
            title: format!("Task {id}"),
            priority: PriorityTier::High,
            status,
            estimated_minutes: 30,
            due_at: Some(Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap()),
            tags: BTreeSet::from(["work".to_string()]),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_unknown_user_vs_empty_user() {
        let db = SqliteStorage::open_memory().unwrap();
        assert!(matches!(
            db.fetch_candidates("ghost"),
            Err(StorageError::UnknownUser(_))
        ));
        db.register_user("u1").unwrap();
        assert!(db.fetch_candidates("u1").unwrap().is_empty());
    }

    #[test]
    fn test_candidate_round_trip_and_filtering() {
        let db = SqliteStorage::open_memory().unwrap();
        db.upsert_candidate("u1", &item("a", CandidateStatus::Todo)).unwrap();
        db.upsert_candidate("u1", &item("b", CandidateStatus::Blocked)).unwrap();
        db.upsert_candidate("u1", &item("c", CandidateStatus::Todo)).unwrap();
        assert!(db
            .set_candidate_status("u1", "c", CandidateStatus::Completed)
            .unwrap());
        assert!(!db
            .set_candidate_status("u1", "zz", CandidateStatus::Completed)
            .unwrap());

        let items = db.fetch_candidates("u1").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], item("a", CandidateStatus::Todo));
        assert!(items[1].is_blocked());
    }

    #[test]
    fn test_checkin_keyed_by_date() {
        let db = SqliteStorage::open_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let checkin = RawCheckin {
            energy_level: 7,
            focus_areas: vec!["work".into()],
            available_minutes: Some(60),
            ..Default::default()
        };
        db.save_checkin("u1", day, &checkin).unwrap();
        assert_eq!(db.fetch_today_checkin("u1", day).unwrap(), Some(checkin));
        assert_eq!(db.fetch_today_checkin("u1", day.succ_opt().unwrap()).unwrap(), None);
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("donext.db");
        let selection = SelectionOutcome {
            chosen_id: "a".into(),
            reason_codes: vec!["deadline_soon".into()],
            alternate_ids: vec![],
            selected_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        };
        {
            let db = SqliteStorage::open(&path).unwrap();
            db.persist_active_selection("u1", &selection).unwrap();
            let state = GamificationState {
                experience: 120,
                level: 2,
                ..Default::default()
            };
            db.persist_gamification_state("u1", &state).unwrap();
        }
        let db = SqliteStorage::open(&path).unwrap();
        assert_eq!(db.active_selection("u1").unwrap(), Some(selection));
        let state = db.fetch_gamification_state("u1").unwrap().unwrap();
        assert_eq!(state.experience, 120);
        assert_eq!(migrations::get_schema_version(&db.conn().unwrap()), migrations::SCHEMA_VERSION);
    }

    #[test]
    fn test_clear_active_selection() {
        let db = SqliteStorage::open_memory().unwrap();
        let selection = SelectionOutcome {
            chosen_id: "a".into(),
            reason_codes: vec!["high_priority".into()],
            alternate_ids: vec![],
            selected_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        };
        db.persist_active_selection("u1", &selection).unwrap();
        db.clear_active_selection("u1").unwrap();
        assert_eq!(db.active_selection("u1").unwrap(), None);
        // Clearing twice is fine.
        db.clear_active_selection("u1").unwrap();
    }

    #[test]
    fn test_activity_from_event_log() {
        let db = SqliteStorage::open_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let log = |action: &str, min: i64| {
            db.append_event_log(
                "u1",
                EventKind::DoAction,
                &json!({
                    "type": "DO_ACTION",
                    "task_id": "a",
                    "action": action,
                    "timestamp": (t0 + Duration::minutes(min)).to_rfc3339(),
                }),
            )
            .unwrap();
        };
        log("start", 0);
        log("pause", 15);
        log("pause", 30);
        log("pause", 40);
        db.append_event_log("u1", EventKind::DayEnd, &json!({"timestamp": t0.to_rfc3339()}))
            .unwrap();

        let activity = db.fetch_task_activity("u1", "a", t0).unwrap();
        assert_eq!(activity.state_entered_at, Some(t0));
        assert_eq!(activity.interruption_count, 3);
        assert_eq!(db.event_count("u1").unwrap(), 5);
    }
}
