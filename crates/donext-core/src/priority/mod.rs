//! Priority engine.
//!
//! Deterministic scoring and ranking of candidates against the current
//! constraints. The selection agent falls back to this ranking whenever the
//! generative path cannot be trusted, so identical inputs must always yield
//! identical ordering: no randomness, no wall clock, no hash-order iteration.

mod engine;
mod scoring;

pub use engine::{PriorityEngine, RankedCandidate};
pub use scoring::{
    avoid_tag_penalty, calculate_score, deadline_score, priority_points, status_penalty,
    ScoreBreakdown,
};
