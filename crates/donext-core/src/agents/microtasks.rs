//! Micro-actions for a stuck episode.

use serde::Deserialize;

use super::{clip, word_count};
use crate::config::StepParams;
use crate::error::ValidationFailure;
use crate::generative::{decode, run_generative_step, GenerativeContext, StepOutcome};
use crate::stuck::StuckSignal;
use crate::task::WorkItemCandidate;

pub const MIN_MICRO_ACTIONS: usize = 2;
pub const MAX_MICRO_ACTIONS: usize = 4;
pub const MAX_MICRO_ACTION_WORDS: usize = 12;
pub const MAX_MICRO_ACTION_CHARS: usize = 100;

const WRITE_NEXT_ACTION: &str = "Write down the very next physical action";
const TEN_MINUTE_TIMER: &str = "Set a 10-minute timer and work only on that";
const CLOSE_DISTRACTIONS: &str = "Close every tab and app this task does not need";
const DEFINE_DONE: &str = "Note in one line what done looks like";
const STRETCH_BREAK: &str = "Stand up and stretch for two minutes";

#[derive(Debug, Deserialize)]
struct MicroActionReply {
    micro_actions: Vec<String>,
}

pub struct MicroActionAgent {
    params: StepParams,
}

impl MicroActionAgent {
    pub fn new(params: StepParams) -> Self {
        Self { params }
    }

    pub async fn suggest(
        &self,
        ctx: GenerativeContext<'_>,
        task: Option<&WorkItemCandidate>,
        signal: &StuckSignal,
    ) -> StepOutcome<Vec<String>> {
        let Some(task) = task else {
            return run_generative_step(
                GenerativeContext::disabled(),
                "micro_actions",
                self.params,
                String::new,
                validate_reply,
                || fallback(signal),
            )
            .await;
        };

        run_generative_step(
            ctx,
            "micro_actions",
            self.params,
            || build_prompt(task, signal),
            validate_reply,
            || fallback(signal),
        )
        .await
    }
}

/// Three or four actions from the fixed pool, picked by the signal.
pub fn fallback(signal: &StuckSignal) -> Vec<String> {
    let mut actions = vec![WRITE_NEXT_ACTION, TEN_MINUTE_TIMER];
    if signal.interruption_count > 0 {
        actions.push(CLOSE_DISTRACTIONS);
    } else {
        actions.push(DEFINE_DONE);
    }
    if signal.elapsed_minutes >= 90 {
        actions.push(STRETCH_BREAK);
    }
    actions.into_iter().map(String::from).collect()
}

pub fn build_prompt(task: &WorkItemCandidate, signal: &StuckSignal) -> String {
    format!(
        "The user seems stuck on a task.\nTask: {}\nMinutes on it: {}\nInterruptions: {}\n\
         Suggest {MIN_MICRO_ACTIONS}-{MAX_MICRO_ACTIONS} tiny concrete actions to get moving again.\n\
         Reply as JSON: {{\"micro_actions\": [strings, each max {MAX_MICRO_ACTION_WORDS} words]}}",
        clip(&task.title, 80),
        signal.elapsed_minutes,
        signal.interruption_count,
    )
}

pub fn validate_reply(reply: serde_json::Value) -> Result<Vec<String>, ValidationFailure> {
    let reply: MicroActionReply = decode(reply)?;
    let actions: Vec<String> = reply
        .micro_actions
        .iter()
        .map(|a| a.trim().to_string())
        .collect();

    if !(MIN_MICRO_ACTIONS..=MAX_MICRO_ACTIONS).contains(&actions.len()) {
        return Err(ValidationFailure::contract(
            "micro_actions",
            format!("expected {MIN_MICRO_ACTIONS}-{MAX_MICRO_ACTIONS} items, got {}", actions.len()),
        ));
    }
    for action in &actions {
        let words = word_count(action);
        if words == 0 || words > MAX_MICRO_ACTION_WORDS || action.chars().count() > MAX_MICRO_ACTION_CHARS {
            return Err(ValidationFailure::contract(
                "micro_actions",
                format!("'{}' is empty or too long", clip(action, 40)),
            ));
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::{FallbackReason, ScriptedGenerator};
    use serde_json::json;

    fn signal(elapsed: u32, interruptions: u32) -> StuckSignal {
        StuckSignal {
            fires: true,
            elapsed_minutes: elapsed,
            interruption_count: interruptions,
        }
    }

    #[test]
    fn test_fallback_size_within_bounds() {
        for (elapsed, interruptions) in [(0, 0), (60, 3), (120, 0), (120, 5)] {
            let actions = fallback(&signal(elapsed, interruptions));
            assert!((MIN_MICRO_ACTIONS..=MAX_MICRO_ACTIONS).contains(&actions.len()));
            assert!(actions.iter().all(|a| word_count(a) <= MAX_MICRO_ACTION_WORDS));
        }
    }

    #[test]
    fn test_fallback_adapts_to_signal() {
        assert!(fallback(&signal(60, 3)).contains(&CLOSE_DISTRACTIONS.to_string()));
        assert!(fallback(&signal(120, 0)).contains(&STRETCH_BREAK.to_string()));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_reply(json!({"micro_actions": ["Open the doc", "Write one line"]})).is_ok());
        assert!(validate_reply(json!({"micro_actions": ["Only one"]})).is_err());
        assert!(validate_reply(json!({"micro_actions": ["a", "b", "c", "d", "e"]})).is_err());
        assert!(validate_reply(json!({"micro_actions": ["a", "   "]})).is_err());
        assert!(validate_reply(json!({"actions": ["a", "b"]})).is_err());
    }

    #[tokio::test]
    async fn test_without_task_uses_templates_without_calling_backend() {
        let gen = ScriptedGenerator::from_values(vec![json!({"micro_actions": ["a b", "c d"]})]);
        let ctx = GenerativeContext::new(Some(&gen), std::time::Duration::from_secs(1));
        let agent = MicroActionAgent::new(StepParams {
            temperature: 0.5,
            max_tokens: 200,
        });
        let outcome = agent.suggest(ctx, None, &signal(60, 3)).await;
        assert!(outcome.used_fallback);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::Disabled));
        assert!(gen.calls().is_empty());
    }
}
