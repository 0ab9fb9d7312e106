//! Daily check-in to selection constraints.
//!
//! The state adapter turns subjective inputs (energy, mood, available time,
//! focus areas) into the numeric/categorical bounds the priority engine and
//! the selection agent work with. It is pure: no clock, no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::config::CheckinConfig;
use crate::task::PriorityTier;

pub const MIN_ENERGY: u8 = 1;
pub const MAX_ENERGY: u8 = 10;
pub const MIN_MINUTES: u32 = 5;
pub const MAX_MINUTES: u32 = 1440;

/// Fixed category vocabulary that focus areas are drawn from.
pub const CATEGORY_VOCABULARY: [&str; 7] = [
    "work",
    "personal",
    "health",
    "learning",
    "creative",
    "social",
    "maintenance",
];

/// Raw check-in as submitted by the user (or stored for today).
///
/// Values are not trusted: out-of-range numbers are clamped by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCheckin {
    /// Self-reported energy, nominally 1-10
    pub energy_level: i64,
    /// Free-form mood label
    #[serde(default)]
    pub mood: Option<String>,
    /// Requested focus areas
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Time available for work, in minutes
    #[serde(default)]
    pub available_minutes: Option<i64>,
    /// Optional priority the user would like to favor
    #[serde(default)]
    pub preferred_priority: Option<PriorityTier>,
    /// Submission time
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Coarse classification of the current work session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Quick,
    Focus,
    Learning,
    Balanced,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Focus => "focus",
            Mode::Learning => "learning",
            Mode::Balanced => "balanced",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds derived from a check-in. Recomputed every cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConstraints {
    /// Energy in [1, 10]
    pub energy: u8,
    /// Available minutes in [5, 1440]
    pub max_minutes: u32,
    pub mode: Mode,
    /// Tags to steer away from; empty means no filtering
    pub avoid_tags: BTreeSet<String>,
    pub preferred_priority: Option<PriorityTier>,
}

impl SelectionConstraints {
    /// Constraints used when no check-in is available.
    pub fn defaults(config: &CheckinConfig) -> Self {
        StateAdapter::with_config(config.clone()).adapt(&RawCheckin {
            energy_level: 5,
            ..Default::default()
        })
    }
}

/// Converts raw check-ins into [`SelectionConstraints`].
pub struct StateAdapter {
    config: CheckinConfig,
}

impl StateAdapter {
    pub fn new() -> Self {
        Self {
            config: CheckinConfig::default(),
        }
    }

    pub fn with_config(config: CheckinConfig) -> Self {
        Self { config }
    }

    /// Derive constraints from a check-in.
    pub fn adapt(&self, checkin: &RawCheckin) -> SelectionConstraints {
        let energy = clamp_energy(checkin.energy_level);
        let max_minutes = clamp_minutes(
            checkin
                .available_minutes
                .unwrap_or(self.config.default_available_minutes as i64),
        );
        let focus = normalize_tags(&checkin.focus_areas);
        let mode = select_mode(energy, max_minutes, &focus);
        let avoid_tags = avoid_tags(&focus);

        SelectionConstraints {
            energy,
            max_minutes,
            mode,
            avoid_tags,
            preferred_priority: checkin.preferred_priority,
        }
    }
}

impl Default for StateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_energy(raw: i64) -> u8 {
    raw.clamp(MIN_ENERGY as i64, MAX_ENERGY as i64) as u8
}

pub fn clamp_minutes(raw: i64) -> u32 {
    raw.clamp(MIN_MINUTES as i64, MAX_MINUTES as i64) as u32
}

/// Mode rules, first match wins.
pub fn select_mode(energy: u8, max_minutes: u32, focus: &BTreeSet<String>) -> Mode {
    if energy <= 2 && max_minutes <= 30 {
        Mode::Quick
    } else if energy >= 8 {
        Mode::Focus
    } else if focus.contains("learning") {
        Mode::Learning
    } else {
        Mode::Balanced
    }
}

/// Vocabulary minus requested focus areas; empty when nothing was requested.
pub fn avoid_tags(focus: &BTreeSet<String>) -> BTreeSet<String> {
    if focus.is_empty() {
        return BTreeSet::new();
    }
    CATEGORY_VOCABULARY
        .iter()
        .filter(|tag| !focus.contains(**tag))
        .map(|tag| tag.to_string())
        .collect()
}

fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
