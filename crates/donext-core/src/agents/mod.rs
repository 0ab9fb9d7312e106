//! Agents that may consult the generative boundary.
//!
//! Each agent owns a prompt builder, a strict validator for the reply, and a
//! deterministic fallback. Control flow is shared through
//! [`crate::generative::run_generative_step`].

pub mod coaching;
pub mod microtasks;
pub mod selection;

pub use coaching::{CoachingAgent, CoachingMessage};
pub use microtasks::MicroActionAgent;
pub use selection::{SelectionAgent, SelectionOutcome, SelectionResult};

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Lowercase snake_case token check used for machine-readable codes.
pub(crate) fn is_token(value: &str, max_len: usize) -> bool {
    !value.is_empty()
        && value.len() <= max_len
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
