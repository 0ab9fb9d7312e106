//! One handler per event kind.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::pipeline::{self, ProgressionRead, Recommendation};
use super::Dispatcher;
use crate::error::{CoreError, Result};
use crate::events::{ConstraintOverrides, Event, TaskAction};
use crate::gamification::{GamificationRules, ProgressionDelta};
use crate::stuck::{StuckDetector, StuckEpisode, TaskActivity};

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Dispatcher {
    fn persist_selection(&self, user_id: &str, rec: &Recommendation) {
        if let Err(e) = self
            .storage
            .persist_active_selection(user_id, &rec.selection.outcome)
        {
            tracing::warn!(error = %e, "failed to persist active selection");
        }
    }

    fn clear_selection(&self, user_id: &str) {
        if let Err(e) = self.storage.clear_active_selection(user_id) {
            tracing::warn!(error = %e, "failed to clear active selection");
        }
    }

    fn log_recommendation(&self, rec: &Recommendation) {
        if let Some(reason) = rec.selection.fallback_reason {
            tracing::info!(
                chosen_id = %rec.selection.outcome.chosen_id,
                reason = reason.as_str(),
                "selection used fallback"
            );
        }
        if let Some(reason) = rec.coaching.fallback_reason {
            tracing::info!(reason = reason.as_str(), "coaching used fallback");
        }
    }

    /// Adapt, rank, select, coach. Writes nothing.
    async fn build_recommendation(
        &self,
        loaded: pipeline::Loaded,
        overrides: Option<&ConstraintOverrides>,
    ) -> Result<Recommendation> {
        let rec = loaded
            .adapt(&self.config.checkin, overrides)
            .rank()
            .recommend(self.generative(), &self.selector, &self.coach)
            .await?;
        self.log_recommendation(&rec);
        Ok(rec)
    }

    /// Build a recommendation, then persist the selection.
    async fn recommend(
        &self,
        user_id: &str,
        loaded: pipeline::Loaded,
        overrides: Option<&ConstraintOverrides>,
    ) -> Result<Recommendation> {
        let rec = self.build_recommendation(loaded, overrides).await?;
        self.persist_selection(user_id, &rec);
        Ok(rec)
    }

    pub(super) async fn app_open(
        &self,
        event: &Event,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let today = self.config.checkin.local_date(now);
        let loaded = pipeline::load(
            self.storage.as_ref(),
            user_id,
            now,
            today,
            true,
            ProgressionRead::BestEffort,
        )?;

        let gamification = loaded.gamification.clone();
        let needs_checkin = loaded.checkin.is_none();
        let candidate_count = loaded.candidates.len();

        let recommendation = if needs_checkin || candidate_count == 0 {
            None
        } else {
            Some(self.recommend(user_id, loaded, None).await?)
        };

        self.log_event(
            user_id,
            event,
            now,
            json!({
                "needs_checkin": needs_checkin,
                "candidate_count": candidate_count,
                "recommendation": recommendation.as_ref().map(Recommendation::log_outcome),
            }),
        );

        Ok(into_map(json!({
            "date": today,
            "needs_checkin": needs_checkin,
            "candidate_count": candidate_count,
            "gamification": gamification,
            "recommendation": recommendation.as_ref().map(Recommendation::to_json),
        })))
    }

    pub(super) async fn checkin_submitted(
        &self,
        event: &Event,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let checkin = event.to_checkin().unwrap_or_default();
        let today = self.config.checkin.local_date(now);
        let loaded =
            pipeline::load(self.storage.as_ref(), user_id, now, today, false, ProgressionRead::Skip)?
                .with_checkin(checkin);

        let rec = self.recommend(user_id, loaded, None).await?;
        self.log_event(user_id, event, now, rec.log_outcome());
        Ok(into_map(rec.to_json()))
    }

    pub(super) async fn do_next(
        &self,
        event: &Event,
        user_id: &str,
        overrides: Option<&ConstraintOverrides>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Map<String, Value>> {
        let now = timestamp.unwrap_or_else(Utc::now);
        let today = self.config.checkin.local_date(now);
        let loaded =
            pipeline::load(self.storage.as_ref(), user_id, now, today, true, ProgressionRead::Skip)?;

        let rec = self.recommend(user_id, loaded, overrides).await?;
        self.log_event(user_id, event, now, rec.log_outcome());
        Ok(into_map(rec.to_json()))
    }

    pub(super) async fn do_action(
        &self,
        event: &Event,
        user_id: &str,
        task_id: &str,
        action: TaskAction,
        now: DateTime<Utc>,
        actual_duration: Option<u32>,
    ) -> Result<Map<String, Value>> {
        match action {
            TaskAction::Complete => {
                self.complete(event, user_id, task_id, now, actual_duration)
                    .await
            }
            TaskAction::Start | TaskAction::Pause | TaskAction::Stuck => {
                self.track(event, user_id, task_id, action, now).await
            }
        }
    }

    /// start / pause / stuck: update activity and run the stuck detector.
    async fn track(
        &self,
        event: &Event,
        user_id: &str,
        task_id: &str,
        action: TaskAction,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let detector = StuckDetector::with_config(self.config.stuck.clone());
        let mut activity = self
            .storage
            .fetch_task_activity(user_id, task_id, detector.window_start(now))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "activity read failed");
                TaskActivity::default()
            });

        // The current event is not in the log yet.
        match action {
            TaskAction::Start => activity.state_entered_at = Some(now),
            TaskAction::Pause => activity.interruption_count += 1,
            _ => {}
        }

        let signal = detector.evaluate(&activity, now);
        let mut micro_fallback = None;
        let episode = if signal.fires || action == TaskAction::Stuck {
            if signal.fires {
                tracing::info!(
                    task_id,
                    elapsed_minutes = signal.elapsed_minutes,
                    interruptions = signal.interruption_count,
                    "stuck pattern detected"
                );
            }
            let task = match self.storage.fetch_candidates(user_id) {
                Ok(candidates) => candidates.into_iter().find(|c| c.id == task_id),
                Err(e) => {
                    tracing::warn!(error = %e, "candidate read failed, using template micro-actions");
                    None
                }
            };
            let outcome = self
                .micro
                .suggest(self.generative(), task.as_ref(), &signal)
                .await;
            micro_fallback = Some(json!({
                "used_fallback": outcome.used_fallback,
                "fallback_reason": outcome.fallback_reason,
            }));
            Some(StuckEpisode {
                triggered_at: now,
                elapsed_minutes: signal.elapsed_minutes,
                interruption_count: signal.interruption_count,
                micro_actions: outcome.output,
                heuristic_fired: signal.fires,
            })
        } else {
            None
        };

        self.log_event(
            user_id,
            event,
            now,
            json!({
                "stuck_fired": signal.fires,
                "micro_actions": micro_fallback,
            }),
        );

        Ok(into_map(json!({
            "task_id": task_id,
            "action": action.as_str(),
            "activity": activity,
            "stuck": episode,
        })))
    }

    /// complete: progression, then the next recommendation over what is left.
    ///
    /// Reads once at the start and writes once at the end. Only an outstanding
    /// item earns progression.
    async fn complete(
        &self,
        event: &Event,
        user_id: &str,
        task_id: &str,
        now: DateTime<Utc>,
        actual_duration: Option<u32>,
    ) -> Result<Map<String, Value>> {
        let today = self.config.checkin.local_date(now);
        let loaded = pipeline::load(
            self.storage.as_ref(),
            user_id,
            now,
            today,
            true,
            ProgressionRead::Required,
        )?;
        let task = loaded.candidates.iter().find(|c| c.id == task_id).cloned();
        let duration = actual_duration.or(task.as_ref().map(|t| t.estimated_minutes));

        let previous = loaded.gamification.clone();
        let (state, delta) = match &task {
            Some(task) => GamificationRules::apply_completion(&previous, task_id, task.priority, today),
            None => {
                tracing::warn!(task_id, "completed item is not outstanding, no progression applied");
                let delta = ProgressionDelta::unchanged(&previous);
                (previous.clone(), delta)
            }
        };
        if delta.duplicate {
            tracing::info!(task_id, "duplicate completion ignored");
        }

        let next = match self.build_recommendation(loaded.without(task_id), None).await {
            Ok(rec) => Some(rec),
            Err(CoreError::NoCandidates) => None,
            Err(e) => return Err(e),
        };

        if state != previous {
            if delta.leveled_up {
                tracing::info!(level = delta.level_after, "level up");
            }
            if let Err(e) = self.storage.persist_gamification_state(user_id, &state) {
                tracing::warn!(error = %e, "failed to persist gamification state");
            }
        }
        match &next {
            Some(rec) => self.persist_selection(user_id, rec),
            None => self.clear_selection(user_id),
        }

        self.log_event(
            user_id,
            event,
            now,
            json!({
                "credited": task.is_some(),
                "experience_gained": delta.experience_gained,
                "duplicate": delta.duplicate,
                "leveled_up": delta.leveled_up,
                "next": next.as_ref().map(Recommendation::log_outcome),
            }),
        );

        Ok(into_map(json!({
            "task_id": task_id,
            "action": TaskAction::Complete.as_str(),
            "actual_duration": duration,
            "progression": delta,
            "gamification": state,
            "next": next.as_ref().map(Recommendation::to_json),
        })))
    }

    pub(super) fn day_end(
        &self,
        event: &Event,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let today = self.config.checkin.local_date(now);
        let state = self
            .storage
            .fetch_gamification_state(user_id)?
            .unwrap_or_default();
        let completed_today = if state.active_on(today) {
            state.completed_on_last_activity.len()
        } else {
            0
        };

        self.log_event(
            user_id,
            event,
            now,
            json!({ "completed_today": completed_today }),
        );

        Ok(into_map(json!({
            "date": today,
            "gamification": state,
            "streak_alive": state.streak_alive(today),
            "completed_today": completed_today,
        })))
    }
}
