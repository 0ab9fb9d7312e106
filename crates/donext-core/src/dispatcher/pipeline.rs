//! Per-invocation recommendation pipeline.
//!
//! Each stage consumes the previous stage's value and returns a new one:
//!
//! ```text
//! Loaded -> Adapted -> Ranked -> Recommendation
//! ```
//!
//! Nothing here outlives one handler pass.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use crate::agents::{CoachingAgent, CoachingMessage, SelectionAgent, SelectionResult};
use crate::checkin::{RawCheckin, SelectionConstraints, StateAdapter};
use crate::config::CheckinConfig;
use crate::error::{CoreError, Result};
use crate::events::ConstraintOverrides;
use crate::gamification::GamificationState;
use crate::generative::{GenerativeContext, StepOutcome};
use crate::priority::{PriorityEngine, RankedCandidate};
use crate::storage::StorageAdapter;
use crate::task::WorkItemCandidate;

/// Energy assumed when neither a check-in nor an override says otherwise.
const DEFAULT_ENERGY: i64 = 5;

/// How a pass treats the progression read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionRead {
    Skip,
    /// Failure is logged and the default state used
    BestEffort,
    /// Failure aborts the pass
    Required,
}

/// External state read at the start of a pass.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
    pub candidates: Vec<WorkItemCandidate>,
    pub checkin: Option<RawCheckin>,
    /// Default when skipped or never stored
    pub gamification: GamificationState,
}

#[derive(Debug, Clone)]
pub struct Adapted {
    pub now: DateTime<Utc>,
    pub candidates: Vec<WorkItemCandidate>,
    pub constraints: SelectionConstraints,
}

#[derive(Debug, Clone)]
pub struct Ranked {
    pub now: DateTime<Utc>,
    pub constraints: SelectionConstraints,
    pub ranked: Vec<RankedCandidate>,
}

/// Final output of a pass: one selection and its coaching message.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub constraints: SelectionConstraints,
    pub task: WorkItemCandidate,
    pub selection: SelectionResult,
    pub coaching: StepOutcome<CoachingMessage>,
}

/// Read candidates, today's check-in if `load_checkin`, and progression
/// according to `progression`.
///
/// A candidate read failure is fatal. A check-in read failure is logged and
/// treated as "no check-in", so constraint defaults apply.
pub fn load(
    storage: &dyn StorageAdapter,
    user_id: &str,
    now: DateTime<Utc>,
    today: NaiveDate,
    load_checkin: bool,
    progression: ProgressionRead,
) -> Result<Loaded> {
    let candidates = storage.fetch_candidates(user_id)?;

    let checkin = if load_checkin {
        match storage.fetch_today_checkin(user_id, today) {
            Ok(checkin) => checkin,
            Err(e) => {
                tracing::warn!(error = %e, "check-in read failed, using default constraints");
                None
            }
        }
    } else {
        None
    };

    let gamification = match progression {
        ProgressionRead::Skip => GamificationState::default(),
        ProgressionRead::BestEffort => match storage.fetch_gamification_state(user_id) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "gamification read failed");
                GamificationState::default()
            }
        },
        // Writing progression over an unread state would reset it.
        ProgressionRead::Required => storage.fetch_gamification_state(user_id)?.unwrap_or_default(),
    };

    Ok(Loaded {
        now,
        today,
        candidates,
        checkin,
        gamification,
    })
}

impl Loaded {
    /// Replace the stored check-in with one that just arrived.
    pub fn with_checkin(self, checkin: RawCheckin) -> Self {
        Self {
            checkin: Some(checkin),
            ..self
        }
    }

    /// Drop one item from the pool (e.g. the one just completed).
    pub fn without(self, task_id: &str) -> Self {
        Self {
            candidates: self
                .candidates
                .into_iter()
                .filter(|c| c.id != task_id)
                .collect(),
            ..self
        }
    }

    pub fn adapt(self, config: &CheckinConfig, overrides: Option<&ConstraintOverrides>) -> Adapted {
        let merged = merge_overrides(self.checkin, overrides);
        let constraints = match merged {
            Some(raw) => StateAdapter::with_config(config.clone()).adapt(&raw),
            None => SelectionConstraints::defaults(config),
        };
        Adapted {
            now: self.now,
            candidates: self.candidates,
            constraints,
        }
    }
}

/// Overlay per-request overrides on a check-in. `None` when there is neither.
pub fn merge_overrides(
    checkin: Option<RawCheckin>,
    overrides: Option<&ConstraintOverrides>,
) -> Option<RawCheckin> {
    let overrides = match overrides {
        Some(o) if !o.is_empty() => o,
        _ => return checkin,
    };
    let mut raw = checkin.unwrap_or(RawCheckin {
        energy_level: DEFAULT_ENERGY,
        ..Default::default()
    });
    if let Some(energy) = overrides.energy {
        raw.energy_level = energy;
    }
    if let Some(minutes) = overrides.available_minutes {
        raw.available_minutes = Some(minutes);
    }
    if let Some(focus) = &overrides.focus_areas {
        raw.focus_areas = focus.clone();
    }
    if let Some(priority) = overrides.preferred_priority {
        raw.preferred_priority = Some(priority);
    }
    Some(raw)
}

impl Adapted {
    pub fn rank(self) -> Ranked {
        let ranked = PriorityEngine::rank(&self.candidates, &self.constraints, self.now);
        Ranked {
            now: self.now,
            constraints: self.constraints,
            ranked,
        }
    }
}

impl Ranked {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Select, then coach. Both steps go through validate-or-fallback.
    ///
    /// # Errors
    /// Returns [`CoreError::NoCandidates`] when nothing is left to rank.
    pub async fn recommend(
        self,
        ctx: GenerativeContext<'_>,
        selector: &SelectionAgent,
        coach: &CoachingAgent,
    ) -> Result<Recommendation> {
        let selection = selector
            .select(ctx, &self.ranked, &self.constraints, self.now)
            .await?;

        let task = self
            .ranked
            .iter()
            .find(|r| r.candidate.id == selection.outcome.chosen_id)
            .map(|r| r.candidate.clone())
            .ok_or(CoreError::NoCandidates)?;

        let coaching = coach
            .coach(
                ctx,
                &task,
                &selection.outcome.reason_codes,
                self.constraints.mode,
            )
            .await;

        Ok(Recommendation {
            constraints: self.constraints,
            task,
            selection,
            coaching,
        })
    }
}

impl Recommendation {
    /// Response body. Fallback flags stay out of it.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "selection": self.selection.outcome,
            "task": self.task,
            "coaching": self.coaching.output,
            "constraints": self.constraints,
        })
    }

    /// Observability record for the event log.
    pub fn log_outcome(&self) -> serde_json::Value {
        json!({
            "chosen_id": self.selection.outcome.chosen_id,
            "selection_used_fallback": self.selection.used_fallback,
            "selection_fallback_reason": self.selection.fallback_reason,
            "coaching_used_fallback": self.coaching.used_fallback,
            "coaching_fallback_reason": self.coaching.fallback_reason,
        })
    }
}
