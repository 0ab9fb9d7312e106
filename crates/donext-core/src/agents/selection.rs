//! Selection agent: exactly one recommended item per cycle.
//!
//! The generative path proposes a choice; the validator enforces membership
//! and length bounds; the priority engine's ranking is the fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{clip, is_token};
use crate::checkin::SelectionConstraints;
use crate::config::StepParams;
use crate::error::{CoreError, ValidationFailure};
use crate::generative::{decode, run_generative_step, FallbackReason, GenerativeContext};
use crate::priority::RankedCandidate;

pub const MAX_REASON_CODES: usize = 3;
pub const MAX_ALTERNATES: usize = 2;
pub const FALLBACK_REASON_CODE: &str = "fallback_deterministic";
/// Only the top of the ranking is shown to the model.
pub const MAX_PROMPT_CANDIDATES: usize = 20;
const MAX_PROMPT_TITLE_CHARS: usize = 80;
const MAX_REASON_CODE_LEN: usize = 40;

/// The active recommendation. At most one per user at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub chosen_id: String,
    pub reason_codes: Vec<String>,
    pub alternate_ids: Vec<String>,
    pub selected_at: DateTime<Utc>,
}

/// Selection plus observability flags that never reach the response body.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub outcome: SelectionOutcome,
    pub used_fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    chosen_id: String,
    #[serde(default)]
    reason_codes: Vec<String>,
    #[serde(default)]
    alternate_ids: Vec<serde_json::Value>,
}

pub struct SelectionAgent {
    params: StepParams,
}

impl SelectionAgent {
    pub fn new(params: StepParams) -> Self {
        Self { params }
    }

    /// Choose one candidate from a non-empty ranking.
    ///
    /// # Errors
    /// Returns [`CoreError::NoCandidates`] when `ranked` is empty.
    pub async fn select(
        &self,
        ctx: GenerativeContext<'_>,
        ranked: &[RankedCandidate],
        constraints: &SelectionConstraints,
        now: DateTime<Utc>,
    ) -> Result<SelectionResult, CoreError> {
        if ranked.is_empty() {
            return Err(CoreError::NoCandidates);
        }

        let step = run_generative_step(
            ctx,
            "selection",
            self.params,
            || build_prompt(ranked, constraints, now),
            |reply| validate_reply(reply, ranked, now),
            || fallback(ranked, now),
        )
        .await;

        Ok(SelectionResult {
            outcome: step.output,
            used_fallback: step.used_fallback,
            fallback_reason: step.fallback_reason,
        })
    }
}

/// Deterministic choice: top-ranked item, next two as alternates.
pub fn fallback(ranked: &[RankedCandidate], now: DateTime<Utc>) -> SelectionOutcome {
    let chosen_id = ranked
        .first()
        .map(|r| r.candidate.id.clone())
        .unwrap_or_default();
    SelectionOutcome {
        chosen_id,
        reason_codes: vec![FALLBACK_REASON_CODE.to_string()],
        alternate_ids: ranked
            .iter()
            .skip(1)
            .take(MAX_ALTERNATES)
            .map(|r| r.candidate.id.clone())
            .collect(),
        selected_at: now,
    }
}

/// Prompt with only id/title/priority/duration/due per item plus constraints.
pub fn build_prompt(
    ranked: &[RankedCandidate],
    constraints: &SelectionConstraints,
    now: DateTime<Utc>,
) -> String {
    let mut lines = Vec::new();
    lines.push("Pick the single best task to do next.".to_string());
    lines.push(format!("Now: {}", now.format("%Y-%m-%d %H:%M UTC")));
    lines.push(format!(
        "Constraints: energy={}/10, max_minutes={}, mode={}",
        constraints.energy, constraints.max_minutes, constraints.mode
    ));
    if !constraints.avoid_tags.is_empty() {
        let avoid: Vec<&str> = constraints.avoid_tags.iter().map(String::as_str).collect();
        lines.push(format!("Avoid tags: {}", avoid.join(", ")));
    }
    if let Some(preferred) = constraints.preferred_priority {
        lines.push(format!("Preferred priority: {preferred}"));
    }
    lines.push("Tasks (id | title | priority | minutes | due):".to_string());
    for r in ranked.iter().take(MAX_PROMPT_CANDIDATES) {
        let c = &r.candidate;
        let due = c
            .due_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "none".to_string());
        lines.push(format!(
            "- {} | {} | {} | {} | {}",
            c.id,
            clip(&c.title, MAX_PROMPT_TITLE_CHARS),
            c.priority,
            c.estimated_minutes,
            due
        ));
    }
    lines.push(format!(
        "Reply as JSON: {{\"chosen_id\": string, \"reason_codes\": [up to {MAX_REASON_CODES} snake_case tokens], \"alternate_ids\": [up to {MAX_ALTERNATES} ids]}}"
    ));
    lines.join("\n")
}

/// Validate a generated selection against this cycle's candidate set.
///
/// Invalid alternates are dropped; everything else fails closed.
pub fn validate_reply(
    reply: serde_json::Value,
    ranked: &[RankedCandidate],
    now: DateTime<Utc>,
) -> Result<SelectionOutcome, ValidationFailure> {
    let reply: SelectionReply = decode(reply)?;
    let known: HashSet<&str> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();

    let chosen_id = reply.chosen_id.trim().to_string();
    let chosen = ranked
        .iter()
        .find(|r| r.candidate.id == chosen_id)
        .ok_or_else(|| ValidationFailure::contract("chosen_id", format!("'{chosen_id}' is not a candidate")))?;

    if chosen.candidate.is_blocked() && ranked.iter().any(|r| !r.candidate.is_blocked()) {
        return Err(ValidationFailure::contract(
            "chosen_id",
            format!("'{chosen_id}' is blocked"),
        ));
    }

    if reply.reason_codes.is_empty() || reply.reason_codes.len() > MAX_REASON_CODES {
        return Err(ValidationFailure::contract(
            "reason_codes",
            format!("expected 1-{MAX_REASON_CODES} codes, got {}", reply.reason_codes.len()),
        ));
    }
    let reason_codes: Vec<String> = reply
        .reason_codes
        .iter()
        .map(|code| code.trim().to_string())
        .collect();
    if let Some(bad) = reason_codes.iter().find(|c| !is_token(c, MAX_REASON_CODE_LEN)) {
        return Err(ValidationFailure::contract(
            "reason_codes",
            format!("'{bad}' is not a snake_case token"),
        ));
    }

    let mut alternate_ids: Vec<String> = Vec::new();
    for alt in reply.alternate_ids.iter().filter_map(|v| v.as_str()) {
        let alt = alt.trim();
        if alt != chosen_id && known.contains(alt) && !alternate_ids.iter().any(|a| a == alt) {
            alternate_ids.push(alt.to_string());
        }
        if alternate_ids.len() == MAX_ALTERNATES {
            break;
        }
    }

    Ok(SelectionOutcome {
        chosen_id,
        reason_codes,
        alternate_ids,
        selected_at: now,
    })
}
