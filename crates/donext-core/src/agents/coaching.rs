//! Coaching agent: a short message for the current selection.

use serde::{Deserialize, Serialize};

use super::{clip, word_count};
use crate::checkin::Mode;
use crate::config::StepParams;
use crate::error::ValidationFailure;
use crate::generative::{decode, run_generative_step, GenerativeContext, StepOutcome};
use crate::task::WorkItemCandidate;

pub const MAX_TITLE_CHARS: usize = 60;
pub const MAX_MESSAGE_CHARS: usize = 200;
pub const MAX_MESSAGE_SENTENCES: usize = 2;
pub const MAX_NEXT_STEP_WORDS: usize = 12;
const MAX_PROMPT_TITLE_CHARS: usize = 80;

/// Coaching shown alongside a selection, 1:1 with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingMessage {
    pub title: String,
    pub message: String,
    pub next_step: String,
}

impl CoachingMessage {
    /// Fixed minimal triple used whenever generation is not trusted.
    pub fn fallback() -> Self {
        Self {
            title: "Your next step".to_string(),
            message: "Start small and keep going.".to_string(),
            next_step: "Open the task and begin".to_string(),
        }
    }
}

pub struct CoachingAgent {
    params: StepParams,
}

impl CoachingAgent {
    pub fn new(params: StepParams) -> Self {
        Self { params }
    }

    pub async fn coach(
        &self,
        ctx: GenerativeContext<'_>,
        task: &WorkItemCandidate,
        reason_codes: &[String],
        mode: Mode,
    ) -> StepOutcome<CoachingMessage> {
        run_generative_step(
            ctx,
            "coaching",
            self.params,
            || build_prompt(task, reason_codes, mode),
            validate_reply,
            CoachingMessage::fallback,
        )
        .await
    }
}

pub fn build_prompt(task: &WorkItemCandidate, reason_codes: &[String], mode: Mode) -> String {
    let due = task
        .due_at
        .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Write a short motivating note for the task below.\n\
         Task: {title}\nPriority: {priority}\nEstimated minutes: {minutes}\nDue: {due}\n\
         Why it was picked: {reasons}\nSession mode: {mode}\n\
         Reply as JSON: {{\"title\": string (max {MAX_TITLE_CHARS} chars), \
         \"message\": string (max {MAX_MESSAGE_SENTENCES} sentences, max {MAX_MESSAGE_CHARS} chars), \
         \"next_step\": string (max {MAX_NEXT_STEP_WORDS} words)}}",
        title = clip(&task.title, MAX_PROMPT_TITLE_CHARS),
        priority = task.priority,
        minutes = task.estimated_minutes,
        reasons = reason_codes.join(", "),
    )
}

/// Number of sentences, counted by terminal punctuation.
///
/// Abbreviations and decimals count as extra sentences; the check is meant
/// to fail closed.
pub fn count_sentences(text: &str) -> usize {
    text.split(|c: char| matches!(c, '.' | '!' | '?'))
        .filter(|segment| segment.chars().any(char::is_alphanumeric))
        .count()
}

pub fn validate_message(msg: &CoachingMessage) -> Result<(), ValidationFailure> {
    let title_len = msg.title.chars().count();
    if msg.title.trim().is_empty() || title_len > MAX_TITLE_CHARS {
        return Err(ValidationFailure::contract(
            "title",
            format!("length {title_len} outside 1-{MAX_TITLE_CHARS}"),
        ));
    }

    let message_len = msg.message.chars().count();
    if msg.message.trim().is_empty() || message_len > MAX_MESSAGE_CHARS {
        return Err(ValidationFailure::contract(
            "message",
            format!("length {message_len} outside 1-{MAX_MESSAGE_CHARS}"),
        ));
    }
    let sentences = count_sentences(&msg.message);
    if sentences > MAX_MESSAGE_SENTENCES {
        return Err(ValidationFailure::contract(
            "message",
            format!("{sentences} sentences, max {MAX_MESSAGE_SENTENCES}"),
        ));
    }

    let words = word_count(&msg.next_step);
    if words == 0 || words > MAX_NEXT_STEP_WORDS {
        return Err(ValidationFailure::contract(
            "next_step",
            format!("{words} words outside 1-{MAX_NEXT_STEP_WORDS}"),
        ));
    }
    Ok(())
}

pub fn validate_reply(reply: serde_json::Value) -> Result<CoachingMessage, ValidationFailure> {
    let msg: CoachingMessage = decode(reply)?;
    let msg = CoachingMessage {
        title: msg.title.trim().to_string(),
        message: msg.message.trim().to_string(),
        next_step: msg.next_step.trim().to_string(),
    };
    validate_message(&msg)?;
    Ok(msg)
}
