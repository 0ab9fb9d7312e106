//! Generative text boundary and the validate-or-fallback step runner.
//!
//! The core depends on exactly one property of a generative backend: it may
//! or may not return parseable structured text. Every step that consults a
//! backend goes through [`run_generative_step`], which owns the control flow
//! shared by selection, coaching, and micro-action personalization:
//!
//! ```text
//! disabled? ── yes ──────────────────────────────> fallback()
//!    │ no
//! build_prompt() -> generate() within timeout
//!    │ error / timeout ──────────────────────────> fallback()
//! validate(reply)
//!    │ violation ────────────────────────────────> fallback()
//!    └── ok ─────────────────────────────────────> output
//! ```

mod http;
mod scripted;

pub use http::HttpGenerator;
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::StepParams;
use crate::error::{GenerativeError, ValidationFailure};

/// A generative text backend.
#[async_trait]
pub trait GenerativeBoundary: Send + Sync {
    /// Produce one structured reply for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GenerativeError>;
}

/// Why a step used its deterministic fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No backend configured
    Disabled,
    /// Network, quota, or HTTP failure
    Unavailable,
    Timeout,
    /// Backend answered with something that is not structured JSON
    ParseError,
    /// Reply parsed but broke its output contract
    ContractViolation,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Disabled => "disabled",
            FallbackReason::Unavailable => "unavailable",
            FallbackReason::Timeout => "timeout",
            FallbackReason::ParseError => "parse_error",
            FallbackReason::ContractViolation => "contract_violation",
        }
    }
}

impl From<&GenerativeError> for FallbackReason {
    fn from(err: &GenerativeError) -> Self {
        match err {
            GenerativeError::Unavailable(_) => FallbackReason::Unavailable,
            GenerativeError::Timeout { .. } => FallbackReason::Timeout,
            GenerativeError::Parse(_) => FallbackReason::ParseError,
        }
    }
}

/// Result of one generative step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome<T> {
    pub output: T,
    pub used_fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
}

impl<T> StepOutcome<T> {
    fn generated(output: T) -> Self {
        Self {
            output,
            used_fallback: false,
            fallback_reason: None,
        }
    }

    fn fallback(output: T, reason: FallbackReason) -> Self {
        Self {
            output,
            used_fallback: true,
            fallback_reason: Some(reason),
        }
    }
}

/// Backend handle plus the per-call timeout, shared by all steps of a pass.
#[derive(Clone, Copy)]
pub struct GenerativeContext<'a> {
    pub generator: Option<&'a dyn GenerativeBoundary>,
    pub timeout: Duration,
}

impl<'a> GenerativeContext<'a> {
    pub fn new(generator: Option<&'a dyn GenerativeBoundary>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// A context that always falls back.
    pub fn disabled() -> Self {
        Self {
            generator: None,
            timeout: Duration::ZERO,
        }
    }
}

/// Run one generative step under the validate-or-fallback contract.
///
/// Exactly one of the generated output or `fallback()` is returned. The
/// prompt is only built when a backend is present.
pub async fn run_generative_step<T, P, V, F>(
    ctx: GenerativeContext<'_>,
    step: &'static str,
    params: StepParams,
    build_prompt: P,
    validate: V,
    fallback: F,
) -> StepOutcome<T>
where
    P: FnOnce() -> String,
    V: FnOnce(serde_json::Value) -> Result<T, ValidationFailure>,
    F: FnOnce() -> T,
{
    let Some(generator) = ctx.generator else {
        tracing::debug!(step, reason = FallbackReason::Disabled.as_str(), "generative step disabled");
        return StepOutcome::fallback(fallback(), FallbackReason::Disabled);
    };

    let prompt = build_prompt();
    let call = generator.generate(&prompt, params.temperature, params.max_tokens);
    let reply = match tokio::time::timeout(ctx.timeout, call).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            let reason = FallbackReason::from(&err);
            tracing::warn!(step, reason = reason.as_str(), error = %err, "generative call failed, using fallback");
            return StepOutcome::fallback(fallback(), reason);
        }
        Err(_) => {
            tracing::warn!(
                step,
                reason = FallbackReason::Timeout.as_str(),
                timeout_ms = ctx.timeout.as_millis() as u64,
                "generative call timed out, using fallback"
            );
            return StepOutcome::fallback(fallback(), FallbackReason::Timeout);
        }
    };

    match validate(reply) {
        Ok(output) => {
            tracing::debug!(step, "generated output accepted");
            StepOutcome::generated(output)
        }
        Err(violation) => {
            let reason = match violation {
                ValidationFailure::Malformed(_) => FallbackReason::ParseError,
                ValidationFailure::Contract { .. } => FallbackReason::ContractViolation,
            };
            tracing::warn!(step, reason = reason.as_str(), error = %violation, "generated output rejected, using fallback");
            StepOutcome::fallback(fallback(), reason)
        }
    }
}

/// Extract a JSON object from model text.
///
/// Accepts a bare object, a Markdown-fenced object, or an object surrounded
/// by prose. Anything else is a parse error; this never guesses.
pub fn parse_structured(text: &str) -> Result<serde_json::Value, GenerativeError> {
    let trimmed = text.trim();
    let start = trimmed
        .find('{')
        .ok_or_else(|| GenerativeError::Parse("no JSON object in reply".into()))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| GenerativeError::Parse("unterminated JSON object".into()))?;
    if end < start {
        return Err(GenerativeError::Parse("unterminated JSON object".into()));
    }

    let value: serde_json::Value = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| GenerativeError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(GenerativeError::Parse("reply is not a JSON object".into()));
    }
    Ok(value)
}

/// Deserialize a reply into a typed shape, failing closed.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    reply: serde_json::Value,
) -> Result<T, ValidationFailure> {
    serde_json::from_value(reply).map_err(|e| ValidationFailure::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARAMS: StepParams = StepParams {
        temperature: 0.2,
        max_tokens: 50,
    };

    fn ctx(generator: &dyn GenerativeBoundary) -> GenerativeContext<'_> {
        GenerativeContext::new(Some(generator), Duration::from_millis(200))
    }

    fn validate_answer(reply: serde_json::Value) -> Result<u32, ValidationFailure> {
        let n = reply
            .get("answer")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ValidationFailure::Malformed("missing answer".into()))?;
        if n > 10 {
            return Err(ValidationFailure::contract("answer", "too large"));
        }
        Ok(n as u32)
    }

    #[tokio::test]
    async fn test_disabled_uses_fallback_without_building_prompt() {
        let outcome = run_generative_step(
            GenerativeContext::disabled(),
            "test",
            PARAMS,
            || panic!("prompt must not be built"),
            validate_answer,
            || 0,
        )
        .await;
        assert!(outcome.used_fallback);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::Disabled));
    }

    #[tokio::test]
    async fn test_valid_reply_is_used() {
        let gen = ScriptedGenerator::from_values(vec![json!({"answer": 7})]);
        let outcome =
            run_generative_step(ctx(&gen), "test", PARAMS, || "q".into(), validate_answer, || 0).await;
        assert_eq!(outcome.output, 7);
        assert!(!outcome.used_fallback);
        assert_eq!(gen.prompts(), vec!["q".to_string()]);
    }

    #[tokio::test]
    async fn test_contract_violation_falls_back() {
        let gen = ScriptedGenerator::from_values(vec![json!({"answer": 99})]);
        let outcome =
            run_generative_step(ctx(&gen), "test", PARAMS, || "q".into(), validate_answer, || 1).await;
        assert_eq!(outcome.output, 1);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::ContractViolation));
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back() {
        let gen = ScriptedGenerator::from_texts(vec!["I think the answer is seven"]);
        let outcome =
            run_generative_step(ctx(&gen), "test", PARAMS, || "q".into(), validate_answer, || 1).await;
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::ParseError));
    }

    #[tokio::test]
    async fn test_unavailable_falls_back() {
        let gen = ScriptedGenerator::from_results(vec![Err(GenerativeError::Unavailable(
            "quota".into(),
        ))]);
        let outcome =
            run_generative_step(ctx(&gen), "test", PARAMS, || "q".into(), validate_answer, || 1).await;
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::Unavailable));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let gen = ScriptedGenerator::from_values(vec![json!({"answer": 3})])
            .with_delay(Duration::from_millis(500));
        let outcome = run_generative_step(
            GenerativeContext::new(Some(&gen), Duration::from_millis(20)),
            "test",
            PARAMS,
            || "q".into(),
            validate_answer,
            || 1,
        )
        .await;
        assert_eq!(outcome.output, 1);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::Timeout));
    }

    #[test]
    fn test_parse_structured_variants() {
        assert!(parse_structured(r#"{"a":1}"#).is_ok());
        assert!(parse_structured("```json\n{\"a\": 1}\n```").is_ok());
        assert!(parse_structured("Sure! {\"a\": 1} Hope that helps.").is_ok());
        assert!(parse_structured("no json here").is_err());
        assert!(parse_structured("{not json}").is_err());
        assert!(parse_structured("} {").is_err());
    }
}
