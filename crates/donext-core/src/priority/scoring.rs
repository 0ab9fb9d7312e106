//! Priority scoring formula.
//!
//! Combines:
//! 1. Deadline proximity: up to 40 points
//! 2. Priority tier: 5 to 30 points
//! 3. Blocked penalty: -50
//! 4. Avoided tags: -15 per overlapping tag

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkin::SelectionConstraints;
use crate::task::{PriorityTier, WorkItemCandidate};

pub const MAX_DEADLINE_POINTS: f64 = 40.0;
/// Anything due within this many hours (or overdue) gets full deadline points.
pub const SATURATION_HOURS: f64 = 4.0;
/// Deadlines further out than this contribute nothing.
pub const HORIZON_HOURS: f64 = 168.0;
pub const BLOCKED_PENALTY: f64 = -50.0;
pub const AVOID_TAG_PENALTY: f64 = -15.0;

/// Per-factor contribution to a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub deadline: f64,
    pub priority: f64,
    pub status: f64,
    pub avoid_tags: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.deadline + self.priority + self.status + self.avoid_tags
    }
}

/// Deadline proximity (0-40 points).
///
/// - No due date: 0
/// - Overdue or due within 4 hours: 40
/// - Due within a week: linear decay from 40 down to 0
/// - Further out: 0
pub fn deadline_score(item: &WorkItemCandidate, now: DateTime<Utc>) -> f64 {
    let Some(due) = item.due_at else {
        return 0.0;
    };

    let hours = due.signed_duration_since(now).num_minutes() as f64 / 60.0;
    if hours <= SATURATION_HOURS {
        MAX_DEADLINE_POINTS
    } else if hours >= HORIZON_HOURS {
        0.0
    } else {
        let remaining = (HORIZON_HOURS - hours) / (HORIZON_HOURS - SATURATION_HOURS);
        MAX_DEADLINE_POINTS * remaining
    }
}

/// Fixed priority table.
pub fn priority_points(tier: PriorityTier) -> f64 {
    match tier {
        PriorityTier::Urgent => 30.0,
        PriorityTier::High => 20.0,
        PriorityTier::Medium => 10.0,
        PriorityTier::Low => 5.0,
    }
}

/// Blocked items are pushed to the bottom of the ranking.
pub fn status_penalty(item: &WorkItemCandidate) -> f64 {
    if item.is_blocked() {
        BLOCKED_PENALTY
    } else {
        0.0
    }
}

pub fn avoid_tag_penalty(item: &WorkItemCandidate, constraints: &SelectionConstraints) -> f64 {
    let overlap = item
        .tags
        .iter()
        .filter(|tag| constraints.avoid_tags.contains(&tag.to_lowercase()))
        .count();
    AVOID_TAG_PENALTY * overlap as f64
}

/// Full score breakdown for one candidate.
pub fn calculate_score(
    item: &WorkItemCandidate,
    constraints: &SelectionConstraints,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        deadline: deadline_score(item, now),
        priority: priority_points(item.priority),
        status: status_penalty(item),
        avoid_tags: avoid_tag_penalty(item, constraints),
    }
}
