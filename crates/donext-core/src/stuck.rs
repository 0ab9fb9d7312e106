//! Stuck-pattern detection.
//!
//! Flags a task that has sat in its current state for a long time while the
//! user keeps getting interrupted. Purely advisory: an episode carries
//! micro-actions for the UI and never touches the active selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StuckConfig;

/// Activity on one task, derived from the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskActivity {
    /// When the task last entered its current state (last `start`)
    pub state_entered_at: Option<DateTime<Utc>>,
    /// Pauses within the session window, since the last completion
    pub interruption_count: u32,
}

/// One event-log record as the activity derivation needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub task_id: String,
    pub action: String,
    pub at: DateTime<Utc>,
}

impl ActionRecord {
    /// Read a record out of a `DO_ACTION` log payload.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let task_id = payload.get("task_id")?.as_str()?.to_string();
        let action = payload.get("action")?.as_str()?.to_string();
        let at = payload
            .get("timestamp")?
            .as_str()?
            .parse::<DateTime<Utc>>()
            .ok()?;
        Some(Self { task_id, action, at })
    }
}

impl TaskActivity {
    /// Fold action records (any order) into the activity of `task_id`.
    ///
    /// Only records at or after `since` count.
    pub fn from_records(records: &[ActionRecord], task_id: &str, since: DateTime<Utc>) -> Self {
        let mut relevant: Vec<&ActionRecord> = records
            .iter()
            .filter(|r| r.task_id == task_id && r.at >= since)
            .collect();
        relevant.sort_by_key(|r| r.at);

        let mut activity = TaskActivity::default();
        for record in relevant {
            match record.action.as_str() {
                "start" => activity.state_entered_at = Some(record.at),
                "pause" => activity.interruption_count += 1,
                "complete" => activity = TaskActivity::default(),
                _ => {}
            }
        }
        activity
    }
}

/// Detector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckSignal {
    pub fires: bool,
    pub elapsed_minutes: u32,
    pub interruption_count: u32,
}

/// Advisory episode returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StuckEpisode {
    pub triggered_at: DateTime<Utc>,
    pub elapsed_minutes: u32,
    pub interruption_count: u32,
    pub micro_actions: Vec<String>,
    /// The threshold heuristic fired (false for a bare self-report)
    pub heuristic_fired: bool,
}

pub struct StuckDetector {
    config: StuckConfig,
}

impl StuckDetector {
    pub fn new() -> Self {
        Self {
            config: StuckConfig::default(),
        }
    }

    pub fn with_config(config: StuckConfig) -> Self {
        Self { config }
    }

    /// Start of the interruption-counting window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.config.session_window_minutes as i64)
    }

    /// Fires only when both elapsed time and interruptions exceed thresholds.
    pub fn evaluate(&self, activity: &TaskActivity, now: DateTime<Utc>) -> StuckSignal {
        let elapsed_minutes = activity
            .state_entered_at
            .map(|at| now.signed_duration_since(at).num_minutes().max(0) as u32)
            .unwrap_or(0);

        StuckSignal {
            fires: elapsed_minutes > self.config.elapsed_threshold_minutes
                && activity.interruption_count > self.config.interruption_threshold,
            elapsed_minutes,
            interruption_count: activity.interruption_count,
        }
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 15, 0, 0).unwrap()
    }

    fn activity(started_min_ago: i64, pauses: u32) -> TaskActivity {
        TaskActivity {
            state_entered_at: Some(now() - Duration::minutes(started_min_ago)),
            interruption_count: pauses,
        }
    }

    fn record(task: &str, action: &str, min_ago: i64) -> ActionRecord {
        ActionRecord {
            task_id: task.into(),
            action: action.into(),
            at: now() - Duration::minutes(min_ago),
        }
    }

    #[test]
    fn test_fires_when_both_thresholds_exceeded() {
        let signal = StuckDetector::new().evaluate(&activity(60, 3), now());
        assert!(signal.fires);
        assert_eq!(signal.elapsed_minutes, 60);
        assert_eq!(signal.interruption_count, 3);
    }

    #[test]
    fn test_does_not_fire_on_one_threshold() {
        let detector = StuckDetector::new();
        assert!(!detector.evaluate(&activity(60, 2), now()).fires);
        assert!(!detector.evaluate(&activity(45, 5), now()).fires);
        assert!(!detector.evaluate(&TaskActivity::default(), now()).fires);
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = StuckDetector::with_config(StuckConfig {
            elapsed_threshold_minutes: 10,
            interruption_threshold: 0,
            session_window_minutes: 60,
        });
        assert!(detector.evaluate(&activity(11, 1), now()).fires);
        assert_eq!(detector.window_start(now()), now() - Duration::minutes(60));
    }

    #[test]
    fn test_activity_from_records() {
        let records = vec![
            record("a", "pause", 10),
            record("a", "start", 50),
            record("b", "pause", 5),
            record("a", "pause", 30),
            record("a", "start", 20),
        ];
        let act = TaskActivity::from_records(&records, "a", now() - Duration::minutes(240));
        assert_eq!(act.state_entered_at, Some(now() - Duration::minutes(20)));
        assert_eq!(act.interruption_count, 2);
    }

    #[test]
    fn test_restart_resets_elapsed_but_keeps_pauses() {
        let records = vec![
            record("a", "start", 50),
            record("a", "pause", 40),
            record("a", "pause", 30),
            record("a", "pause", 20),
            record("a", "start", 5),
        ];
        let act = TaskActivity::from_records(&records, "a", now() - Duration::minutes(240));
        assert_eq!(act.state_entered_at, Some(now() - Duration::minutes(5)));
        assert_eq!(act.interruption_count, 3);

        let signal = StuckDetector::new().evaluate(&act, now());
        assert_eq!(signal.elapsed_minutes, 5);
        assert!(!signal.fires);
    }

    #[test]
    fn test_activity_respects_window_and_completion() {
        let records = vec![
            record("a", "start", 300),
            record("a", "pause", 290),
            record("a", "start", 100),
            record("a", "complete", 90),
            record("a", "start", 20),
        ];
        let act = TaskActivity::from_records(&records, "a", now() - Duration::minutes(240));
        assert_eq!(act.state_entered_at, Some(now() - Duration::minutes(20)));
        assert_eq!(act.interruption_count, 0);
    }

    #[test]
    fn test_record_from_payload() {
        let payload = json!({
            "type": "DO_ACTION",
            "task_id": "t1",
            "action": "pause",
            "timestamp": "2026-07-01T14:00:00Z"
        });
        let rec = ActionRecord::from_payload(&payload).unwrap();
        assert_eq!(rec.task_id, "t1");
        assert_eq!(rec.action, "pause");
        assert!(ActionRecord::from_payload(&json!({"type": "DAY_END"})).is_none());
    }
}
