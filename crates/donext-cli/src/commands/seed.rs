use chrono::{DateTime, Utc};
use donext_core::{CandidateStatus, PriorityTier, SqliteStorage, WorkItemCandidate};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Deserialize)]
struct SeedFile {
    user_id: String,
    #[serde(default)]
    candidates: Vec<SeedItem>,
}

/// A work item as written by hand; timestamps and status are optional.
#[derive(Deserialize)]
struct SeedItem {
    id: String,
    title: String,
    #[serde(default)]
    priority: PriorityTier,
    #[serde(default)]
    status: CandidateStatus,
    #[serde(default = "default_estimate")]
    estimated_minutes: u32,
    #[serde(default)]
    due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn default_estimate() -> u32 {
    30
}

impl SeedItem {
    fn into_candidate(self, now: DateTime<Utc>) -> WorkItemCandidate {
        WorkItemCandidate {
            id: self.id,
            title: self.title,
            priority: self.priority,
            status: self.status,
            estimated_minutes: self.estimated_minutes,
            due_at: self.due_at,
            tags: self.tags,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

pub fn run(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let seed: SeedFile = serde_json::from_str(&content)?;

    let storage = SqliteStorage::open_default()?;
    storage.register_user(&seed.user_id)?;

    let now = Utc::now();
    let count = seed.candidates.len();
    for item in seed.candidates {
        storage.upsert_candidate(&seed.user_id, &item.into_candidate(now))?;
    }

    println!("seeded {count} candidates for {}", seed.user_id);
    Ok(())
}
