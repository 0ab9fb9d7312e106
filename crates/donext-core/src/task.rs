//! Work item snapshots as read from the storage adapter.
//!
//! The authoritative copy of a work item lives outside the core. A
//! [`WorkItemCandidate`] is a read-only snapshot taken once per handler pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Priority tier, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Urgent,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
            PriorityTier::Urgent => "urgent",
        }
    }

    /// Parse a tier name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(PriorityTier::Low),
            "medium" => Some(PriorityTier::Medium),
            "high" => Some(PriorityTier::High),
            "urgent" => Some(PriorityTier::Urgent),
            _ => None,
        }
    }
}

impl Default for PriorityTier {
    fn default() -> Self {
        PriorityTier::Medium
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item status.
///
/// Completed and cancelled items never reach the core; the storage adapter
/// filters them out. They exist here so adapters can share one type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Todo,
    InProgress,
    Paused,
    /// Waiting on another item or an external dependency
    Blocked,
    Completed,
    Cancelled,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Todo => "todo",
            CandidateStatus::InProgress => "in_progress",
            CandidateStatus::Paused => "paused",
            CandidateStatus::Blocked => "blocked",
            CandidateStatus::Completed => "completed",
            CandidateStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(CandidateStatus::Todo),
            "in_progress" => Some(CandidateStatus::InProgress),
            "paused" => Some(CandidateStatus::Paused),
            "blocked" => Some(CandidateStatus::Blocked),
            "completed" => Some(CandidateStatus::Completed),
            "cancelled" => Some(CandidateStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether an item in this state is still outstanding work.
    pub fn is_open(&self) -> bool {
        !matches!(self, CandidateStatus::Completed | CandidateStatus::Cancelled)
    }
}

impl Default for CandidateStatus {
    fn default() -> Self {
        CandidateStatus::Todo
    }
}

/// An outstanding work item eligible for recommendation this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemCandidate {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    /// Priority tier
    #[serde(default)]
    pub priority: PriorityTier,
    /// Current status
    #[serde(default)]
    pub status: CandidateStatus,
    /// Estimated duration in minutes
    pub estimated_minutes: u32,
    /// Optional due timestamp
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    /// Category tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl WorkItemCandidate {
    pub fn is_blocked(&self) -> bool {
        self.status == CandidateStatus::Blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_tier_ordering() {
        assert!(PriorityTier::Urgent > PriorityTier::High);
        assert!(PriorityTier::High > PriorityTier::Medium);
        assert!(PriorityTier::Medium > PriorityTier::Low);
    }

    #[test]
    fn test_priority_tier_parse_is_case_insensitive() {
        assert_eq!(PriorityTier::parse("URGENT"), Some(PriorityTier::Urgent));
        assert_eq!(PriorityTier::parse(" low "), Some(PriorityTier::Low));
        assert_eq!(PriorityTier::parse("p1"), None);
    }

    #[test]
    fn test_status_open() {
        assert!(CandidateStatus::Blocked.is_open());
        assert!(!CandidateStatus::Completed.is_open());
        assert!(!CandidateStatus::Cancelled.is_open());
    }

    #[test]
    fn test_candidate_deserializes_with_defaults() {
        let json = r#"{
            "id": "t1",
            "title": "Write report",
            "estimated_minutes": 30,
            "created_at": "2026-01-05T09:00:00Z"
        }"#;
        let item: WorkItemCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(item.priority, PriorityTier::Medium);
        assert_eq!(item.status, CandidateStatus::Todo);
        assert!(item.tags.is_empty());
        assert!(item.due_at.is_none());
    }
}
