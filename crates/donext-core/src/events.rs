use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checkin::RawCheckin;
use crate::task::PriorityTier;

/// User lifecycle events the dispatcher accepts.
///
/// Serialized with a `type` tag, e.g. `{"type": "DAY_END", "user_id": "u1", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    AppOpen {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    CheckinSubmitted {
        user_id: String,
        energy_level: i64,
        #[serde(default)]
        focus_areas: Vec<String>,
        #[serde(default)]
        available_minutes: Option<i64>,
        #[serde(default)]
        mood: Option<String>,
        timestamp: DateTime<Utc>,
    },
    DoNext {
        user_id: String,
        #[serde(default)]
        constraints: Option<ConstraintOverrides>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    DoAction {
        user_id: String,
        task_id: String,
        action: TaskAction,
        timestamp: DateTime<Utc>,
        /// Minutes actually spent; expected for `complete`
        #[serde(default)]
        actual_duration: Option<u32>,
    },
    DayEnd {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// Per-request constraint overrides for `DO_NEXT`. Unset fields fall back to
/// today's check-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOverrides {
    #[serde(default)]
    pub energy: Option<i64>,
    #[serde(default)]
    pub available_minutes: Option<i64>,
    #[serde(default)]
    pub focus_areas: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_priority: Option<PriorityTier>,
}

impl ConstraintOverrides {
    pub fn is_empty(&self) -> bool {
        self.energy.is_none()
            && self.available_minutes.is_none()
            && self.focus_areas.is_none()
            && self.preferred_priority.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Start,
    Pause,
    Complete,
    Stuck,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Start => "start",
            TaskAction::Pause => "pause",
            TaskAction::Complete => "complete",
            TaskAction::Stuck => "stuck",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AppOpen,
    CheckinSubmitted,
    DoNext,
    DoAction,
    DayEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AppOpen => "APP_OPEN",
            EventKind::CheckinSubmitted => "CHECKIN_SUBMITTED",
            EventKind::DoNext => "DO_NEXT",
            EventKind::DoAction => "DO_ACTION",
            EventKind::DayEnd => "DAY_END",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "APP_OPEN" => Some(EventKind::AppOpen),
            "CHECKIN_SUBMITTED" => Some(EventKind::CheckinSubmitted),
            "DO_NEXT" => Some(EventKind::DoNext),
            "DO_ACTION" => Some(EventKind::DoAction),
            "DAY_END" => Some(EventKind::DayEnd),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AppOpen { .. } => EventKind::AppOpen,
            Event::CheckinSubmitted { .. } => EventKind::CheckinSubmitted,
            Event::DoNext { .. } => EventKind::DoNext,
            Event::DoAction { .. } => EventKind::DoAction,
            Event::DayEnd { .. } => EventKind::DayEnd,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Event::AppOpen { user_id, .. }
            | Event::CheckinSubmitted { user_id, .. }
            | Event::DoNext { user_id, .. }
            | Event::DoAction { user_id, .. }
            | Event::DayEnd { user_id, .. } => user_id,
        }
    }

    /// Event time, if the event carries one.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Event::AppOpen { timestamp, .. }
            | Event::CheckinSubmitted { timestamp, .. }
            | Event::DoAction { timestamp, .. }
            | Event::DayEnd { timestamp, .. } => Some(*timestamp),
            Event::DoNext { timestamp, .. } => *timestamp,
        }
    }

    /// The check-in carried by a `CHECKIN_SUBMITTED` event.
    pub fn to_checkin(&self) -> Option<RawCheckin> {
        match self {
            Event::CheckinSubmitted {
                energy_level,
                focus_areas,
                available_minutes,
                mood,
                timestamp,
                ..
            } => Some(RawCheckin {
                energy_level: *energy_level,
                mood: mood.clone(),
                focus_areas: focus_areas.clone(),
                available_minutes: *available_minutes,
                preferred_priority: None,
                submitted_at: Some(*timestamp),
            }),
            _ => None,
        }
    }
}

/// Response envelope returned for every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Map::new(),
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tagging() {
        let event: Event = serde_json::from_value(json!({
            "type": "CHECKIN_SUBMITTED",
            "user_id": "u1",
            "energy_level": 6,
            "focus_areas": ["work"],
            "available_minutes": 90,
            "timestamp": "2026-03-02T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.kind(), EventKind::CheckinSubmitted);
        assert_eq!(event.user_id(), "u1");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "CHECKIN_SUBMITTED");

        let checkin = event.to_checkin().unwrap();
        assert_eq!(checkin.energy_level, 6);
        assert_eq!(checkin.available_minutes, Some(90));
        assert!(checkin.submitted_at.is_some());
    }

    #[test]
    fn test_do_next_minimal() {
        let event: Event = serde_json::from_value(json!({"type": "DO_NEXT", "user_id": "u1"})).unwrap();
        assert_eq!(event.timestamp(), None);
        assert_eq!(
            event,
            Event::DoNext {
                user_id: "u1".into(),
                constraints: None,
                timestamp: None
            }
        );
    }

    #[test]
    fn test_do_action_payload() {
        let event: Event = serde_json::from_value(json!({
            "type": "DO_ACTION",
            "user_id": "u1",
            "task_id": "t1",
            "action": "complete",
            "timestamp": "2026-03-02T08:00:00Z",
            "actual_duration": 25
        }))
        .unwrap();
        let Event::DoAction { action, actual_duration, .. } = event else {
            panic!("expected DO_ACTION");
        };
        assert_eq!(action, TaskAction::Complete);
        assert_eq!(actual_duration, Some(25));
    }

    #[test]
    fn test_unknown_kind_fails_to_parse() {
        let result: Result<Event, _> =
            serde_json::from_value(json!({"type": "TELEPORT", "user_id": "u1"}));
        assert!(result.is_err());
        assert_eq!(EventKind::parse("TELEPORT"), None);
        assert_eq!(EventKind::parse("DAY_END"), Some(EventKind::DayEnd));
    }

    #[test]
    fn test_failure_envelope_omits_nothing_important() {
        let resp = Response::failure("no candidates");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "no candidates");
        assert!(value["data"].as_object().unwrap().is_empty());
    }
}
