//! Experience, level, and daily streak progression.
//!
//! Progression changes only on completion events. The transition is a pure
//! function of the previous state, the completed item, and the local calendar
//! date of the completion, so replaying the same completion is harmless.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::task::PriorityTier;

/// Cumulative experience required to reach each level (index 0 = level 1).
pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 450, 700, 1000, 1400, 1900, 2500, 3200];

/// Experience granted per completed item, by priority tier.
pub fn experience_for(tier: PriorityTier) -> u64 {
    match tier {
        PriorityTier::Urgent => 50,
        PriorityTier::High => 30,
        PriorityTier::Medium => 20,
        PriorityTier::Low => 10,
    }
}

/// Level for a given experience total. Monotonic and stepwise.
pub fn level_for(experience: u64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|&required| required <= experience)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(1)
}

/// Per-user progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationState {
    /// Never decreases outside an explicit reset
    pub experience: u64,
    /// Always `level_for(experience)`
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    /// Item ids completed on `last_activity_date`
    #[serde(default)]
    pub completed_on_last_activity: BTreeSet<String>,
    /// Item ids credited for an earlier day since `last_activity_date` began
    #[serde(default)]
    pub late_completions: BTreeSet<String>,
}

impl Default for GamificationState {
    fn default() -> Self {
        Self {
            experience: 0,
            level: 1,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            completed_on_last_activity: BTreeSet::new(),
            late_completions: BTreeSet::new(),
        }
    }
}

impl GamificationState {
    /// Whether the streak has already been extended on `today`.
    pub fn active_on(&self, today: NaiveDate) -> bool {
        self.last_activity_date == Some(today)
    }

    /// Whether the current streak can still be continued on `today`.
    pub fn streak_alive(&self, today: NaiveDate) -> bool {
        match self.last_activity_date {
            Some(last) => last == today || last.succ_opt() == Some(today),
            None => false,
        }
    }
}

/// What a completion changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionDelta {
    pub experience_gained: u64,
    pub level_before: u32,
    pub level_after: u32,
    pub leveled_up: bool,
    pub streak_before: u32,
    pub streak_after: u32,
    /// Same item already completed that day; nothing was applied
    pub duplicate: bool,
}

impl ProgressionDelta {
    /// A completion that changed nothing.
    pub fn unchanged(state: &GamificationState) -> Self {
        let level = level_for(state.experience);
        Self {
            experience_gained: 0,
            level_before: level,
            level_after: level,
            leveled_up: false,
            streak_before: state.current_streak,
            streak_after: state.current_streak,
            duplicate: false,
        }
    }
}

/// Applies completion events to a [`GamificationState`].
pub struct GamificationRules;

impl GamificationRules {
    /// Apply one completion of `task_id` on the local date `on`.
    pub fn apply_completion(
        previous: &GamificationState,
        task_id: &str,
        tier: PriorityTier,
        on: NaiveDate,
    ) -> (GamificationState, ProgressionDelta) {
        let level_before = level_for(previous.experience);

        let already_credited = match previous.last_activity_date {
            Some(last) if last == on => previous.completed_on_last_activity.contains(task_id),
            Some(last) if last > on => previous.late_completions.contains(task_id),
            _ => false,
        };
        if already_credited {
            let delta = ProgressionDelta {
                duplicate: true,
                ..ProgressionDelta::unchanged(previous)
            };
            return (previous.clone(), delta);
        }

        let gain = experience_for(tier);
        let experience = previous.experience.saturating_add(gain);
        let level = level_for(experience);

        let mut completed = previous.completed_on_last_activity.clone();
        let mut late = previous.late_completions.clone();
        let (current_streak, last_activity_date) = match previous.last_activity_date {
            // Same day, or a late-arriving completion for an earlier day.
            Some(last) if last >= on => (previous.current_streak.max(1), Some(last)),
            Some(last) if last.succ_opt() == Some(on) => {
                completed.clear();
                late.clear();
                (previous.current_streak.saturating_add(1), Some(on))
            }
            _ => {
                completed.clear();
                late.clear();
                (1, Some(on))
            }
        };
        if last_activity_date == Some(on) {
            completed.insert(task_id.to_string());
        } else {
            late.insert(task_id.to_string());
        }

        let next = GamificationState {
            experience,
            level,
            current_streak,
            longest_streak: previous.longest_streak.max(current_streak),
            last_activity_date,
            completed_on_last_activity: completed,
            late_completions: late,
        };
        let delta = ProgressionDelta {
            experience_gained: gain,
            level_before,
            level_after: level,
            leveled_up: level > level_before,
            streak_before: previous.current_streak,
            streak_after: current_streak,
            duplicate: false,
        };
        (next, delta)
    }

    /// Explicit reset; the only way experience goes down.
    pub fn reset() -> GamificationState {
        GamificationState::default()
    }
}
