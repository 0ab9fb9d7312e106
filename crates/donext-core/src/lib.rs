//! # donext Core Library
//!
//! This library decides what a user should work on next. It is event-driven:
//! a host feeds it user lifecycle events (app open, check-in, "do next",
//! task actions, day end) and gets back a response envelope. The core keeps
//! no state between events; everything it needs is re-read through a storage
//! adapter the host supplies.
//!
//! ## Architecture
//!
//! - **Dispatcher**: routes each event to its handler and turns every internal
//!   error into a generic failure response
//! - **State Adapter**: maps a daily check-in to selection constraints
//! - **Priority Engine**: deterministic scoring and ordering of candidates
//! - **Agents**: selection, coaching and micro-action steps that may consult a
//!   generative backend, each with strict validation and a deterministic fallback
//! - **Gamification**: experience, levels and day streaks on completion
//! - **Stuck detection**: advisory detection of stalled tasks
//! - **Storage**: the adapter boundary, with in-memory and SQLite implementations
//!
//! ## Key Components
//!
//! - [`Dispatcher`]: the single entry point, `process(event) -> Response`
//! - [`StorageAdapter`]: what the core needs from its environment
//! - [`GenerativeBoundary`]: what the core needs from a text generator
//! - [`Config`]: application configuration management

pub mod agents;
pub mod checkin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gamification;
pub mod generative;
pub mod priority;
pub mod storage;
pub mod stuck;
pub mod task;

pub use agents::{CoachingMessage, SelectionOutcome};
pub use checkin::{Mode, RawCheckin, SelectionConstraints, StateAdapter};
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, CoreError, GenerativeError, StorageError, ValidationFailure};
pub use events::{ConstraintOverrides, Event, EventKind, Response, TaskAction};
pub use gamification::{GamificationRules, GamificationState, ProgressionDelta};
pub use generative::{GenerativeBoundary, HttpGenerator, ScriptedGenerator};
pub use priority::{PriorityEngine, RankedCandidate};
pub use storage::{MemoryStorage, SqliteStorage, StorageAdapter};
pub use stuck::{StuckDetector, StuckEpisode, StuckSignal, TaskActivity};
pub use task::{CandidateStatus, PriorityTier, WorkItemCandidate};
