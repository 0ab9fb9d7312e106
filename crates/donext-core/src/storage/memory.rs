//! In-process storage.
//!
//! Backs tests and embedded hosts. Failure switches let callers exercise the
//! error paths of the dispatcher without a real backend.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{payload_time, StorageAdapter};
use crate::agents::SelectionOutcome;
use crate::checkin::RawCheckin;
use crate::error::StorageError;
use crate::events::EventKind;
use crate::gamification::GamificationState;
use crate::stuck::{ActionRecord, TaskActivity};
use crate::task::WorkItemCandidate;

/// One appended log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub user_id: String,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Default)]
struct Inner {
    candidates: HashMap<String, Vec<WorkItemCandidate>>,
    checkins: HashMap<(String, NaiveDate), RawCheckin>,
    active: HashMap<String, SelectionOutcome>,
    gamification: HashMap<String, GamificationState>,
    log: Vec<LoggedEvent>,
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
    fail_candidate_reads: AtomicBool,
    fail_checkin_reads: AtomicBool,
    fail_gamification_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::ReadFailed("memory store lock poisoned".into()))
    }

    /// Register a user with their outstanding items (an empty list is a
    /// known user with nothing to do).
    pub fn set_candidates(&self, user_id: &str, candidates: Vec<WorkItemCandidate>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.candidates.insert(user_id.to_string(), candidates);
        }
    }

    pub fn set_checkin(&self, user_id: &str, date: NaiveDate, checkin: RawCheckin) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.checkins.insert((user_id.to_string(), date), checkin);
        }
    }

    pub fn set_gamification(&self, user_id: &str, state: GamificationState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.gamification.insert(user_id.to_string(), state);
        }
    }

    pub fn fail_candidate_reads(&self, fail: bool) {
        self.fail_candidate_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_checkin_reads(&self, fail: bool) {
        self.fail_checkin_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gamification_reads(&self, fail: bool) {
        self.fail_gamification_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every persist/append call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn active_selection(&self, user_id: &str) -> Option<SelectionOutcome> {
        self.inner.lock().ok()?.active.get(user_id).cloned()
    }

    pub fn gamification(&self, user_id: &str) -> Option<GamificationState> {
        self.inner.lock().ok()?.gamification.get(user_id).cloned()
    }

    pub fn event_log(&self, user_id: &str) -> Vec<LoggedEvent> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .log
                    .iter()
                    .filter(|e| e.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("memory store is read-only".into()));
        }
        Ok(())
    }
}

impl StorageAdapter for MemoryStorage {
    fn fetch_candidates(&self, user_id: &str) -> Result<Vec<WorkItemCandidate>, StorageError> {
        if self.fail_candidate_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed("candidates unavailable".into()));
        }
        let inner = self.lock()?;
        let items = inner
            .candidates
            .get(user_id)
            .ok_or_else(|| StorageError::UnknownUser(user_id.to_string()))?;
        Ok(items.iter().filter(|c| c.status.is_open()).cloned().collect())
    }

    fn fetch_today_checkin(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<RawCheckin>, StorageError> {
        if self.fail_checkin_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed("check-ins unavailable".into()));
        }
        Ok(self
            .lock()?
            .checkins
            .get(&(user_id.to_string(), date))
            .cloned())
    }

    fn fetch_gamification_state(
        &self,
        user_id: &str,
    ) -> Result<Option<GamificationState>, StorageError> {
        if self.fail_gamification_reads.load(Ordering::SeqCst) {
            return Err(StorageError::ReadFailed("progression unavailable".into()));
        }
        Ok(self.lock()?.gamification.get(user_id).cloned())
    }

    fn fetch_task_activity(
        &self,
        user_id: &str,
        task_id: &str,
        since: DateTime<Utc>,
    ) -> Result<TaskActivity, StorageError> {
        let inner = self.lock()?;
        let records: Vec<ActionRecord> = inner
            .log
            .iter()
            .filter(|e| e.user_id == user_id && e.kind == EventKind::DoAction)
            .filter_map(|e| ActionRecord::from_payload(&e.payload))
            .collect();
        Ok(TaskActivity::from_records(&records, task_id, since))
    }

    fn persist_active_selection(
        &self,
        user_id: &str,
        selection: &SelectionOutcome,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.lock()?
            .active
            .insert(user_id.to_string(), selection.clone());
        Ok(())
    }

    fn clear_active_selection(&self, user_id: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.lock()?.active.remove(user_id);
        Ok(())
    }

    fn persist_gamification_state(
        &self,
        user_id: &str,
        state: &GamificationState,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.lock()?
            .gamification
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    fn append_event_log(
        &self,
        user_id: &str,
        kind: EventKind,
        payload: &serde_json::Value,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        self.lock()?.log.push(LoggedEvent {
            user_id: user_id.to_string(),
            kind,
            at: payload_time(payload),
            payload: payload.clone(),
        });
        Ok(())
    }
}
