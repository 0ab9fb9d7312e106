//! Ranking over a candidate snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::scoring::{calculate_score, ScoreBreakdown};
use crate::checkin::SelectionConstraints;
use crate::task::WorkItemCandidate;

/// A candidate with its computed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: WorkItemCandidate,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Stateless ranking engine.
pub struct PriorityEngine;

impl PriorityEngine {
    /// Score every candidate and order them best first.
    ///
    /// Ties break on shorter estimate, then earlier creation, then id, so the
    /// order is total and stable across runs.
    pub fn rank(
        candidates: &[WorkItemCandidate],
        constraints: &SelectionConstraints,
        now: DateTime<Utc>,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .map(|candidate| {
                let breakdown = calculate_score(candidate, constraints, now);
                RankedCandidate {
                    candidate: candidate.clone(),
                    score: breakdown.total(),
                    breakdown,
                }
            })
            .collect();

        ranked.sort_by(compare);
        ranked
    }
}

fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.estimated_minutes.cmp(&b.candidate.estimated_minutes))
        .then_with(|| a.candidate.created_at.cmp(&b.candidate.created_at))
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkin::Mode;
    use crate::task::{CandidateStatus, PriorityTier};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    fn constraints() -> SelectionConstraints {
        SelectionConstraints {
            energy: 6,
            max_minutes: 90,
            mode: Mode::Balanced,
            avoid_tags: BTreeSet::new(),
            preferred_priority: None,
        }
    }

    fn item(id: &str, tier: PriorityTier, minutes: u32, created_offset_min: i64) -> WorkItemCandidate {
        WorkItemCandidate {
            id: id.into(),
            title: format!("Task {id}"),
            priority: tier,
            status: CandidateStatus::Todo,
            estimated_minutes: minutes,
            due_at: None,
            tags: BTreeSet::new(),
            created_at: now() - Duration::days(3) + Duration::minutes(created_offset_min),
        }
    }

    fn ids(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|r| r.candidate.id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_descending() {
        let candidates = vec![
            item("low", PriorityTier::Low, 25, 0),
            item("urgent", PriorityTier::Urgent, 25, 0),
            item("medium", PriorityTier::Medium, 25, 0),
        ];
        let ranked = PriorityEngine::rank(&candidates, &constraints(), now());
        assert_eq!(ids(&ranked), vec!["urgent", "medium", "low"]);
    }

    #[test]
    fn test_ties_break_on_duration_then_creation() {
        let candidates = vec![
            item("long", PriorityTier::High, 60, 0),
            item("short-late", PriorityTier::High, 15, 10),
            item("short-early", PriorityTier::High, 15, 5),
        ];
        let ranked = PriorityEngine::rank(&candidates, &constraints(), now());
        assert_eq!(ids(&ranked), vec!["short-early", "short-late", "long"]);
    }

    #[test]
    fn test_blocked_sinks() {
        let mut blocked = item("blocked", PriorityTier::Urgent, 10, 0);
        blocked.status = CandidateStatus::Blocked;
        blocked.due_at = Some(now() + Duration::hours(1));
        let candidates = vec![blocked, item("low", PriorityTier::Low, 30, 0)];
        let ranked = PriorityEngine::rank(&candidates, &constraints(), now());
        assert_eq!(ids(&ranked), vec!["low", "blocked"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(PriorityEngine::rank(&[], &constraints(), now()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_ranking_is_deterministic_and_order_independent(
            items in proptest::collection::vec((0u8..4, 5u32..120, 0i64..50, proptest::option::of(-10i64..200)), 0..12)
        ) {
            let candidates: Vec<WorkItemCandidate> = items
                .iter()
                .enumerate()
                .map(|(i, (tier, minutes, created, due))| {
                    let tier = match tier {
                        0 => PriorityTier::Low,
                        1 => PriorityTier::Medium,
                        2 => PriorityTier::High,
                        _ => PriorityTier::Urgent,
                    };
                    let mut c = item(&format!("t{i}"), tier, *minutes, *created);
                    c.due_at = due.map(|h| now() + Duration::hours(h));
                    c
                })
                .collect();

            let first = PriorityEngine::rank(&candidates, &constraints(), now());
            let second = PriorityEngine::rank(&candidates, &constraints(), now());
            prop_assert_eq!(&first, &second);

            let mut reversed = candidates.clone();
            reversed.reverse();
            let third = PriorityEngine::rank(&reversed, &constraints(), now());
            prop_assert_eq!(ids(&first), ids(&third));
        }
    }
}
