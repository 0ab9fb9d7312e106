use donext_core::{
    CandidateStatus, Config, Dispatcher, Event, GenerativeBoundary, HttpGenerator, SqliteStorage,
    TaskAction,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(json: Option<String>, file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match (json, file) {
        (Some(json), _) => json,
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let value: serde_json::Value = serde_json::from_str(&raw)?;

    let config = Config::load_or_default();
    let storage = Arc::new(SqliteStorage::open_default()?);
    let generator: Option<Arc<dyn GenerativeBoundary>> = if config.generative.enabled {
        Some(Arc::new(HttpGenerator::from_config(&config.generative)))
    } else {
        None
    };

    // Kept aside for the host-side bookkeeping below.
    let event = serde_json::from_value::<Event>(value.clone()).ok();

    let dispatcher = Dispatcher::new(storage.clone(), generator, config.clone());
    let response = dispatcher.process_json(value).await;

    if let Some(event) = &event {
        record_host_state(&storage, &config, event, response.success);
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

/// The store is authoritative for check-ins and item status; the core only
/// reads them.
fn record_host_state(storage: &SqliteStorage, config: &Config, event: &Event, success: bool) {
    match event {
        Event::CheckinSubmitted {
            user_id, timestamp, ..
        } => {
            let Some(checkin) = event.to_checkin() else {
                return;
            };
            let date = config.checkin.local_date(*timestamp);
            if let Err(e) = storage.save_checkin(user_id, date, &checkin) {
                tracing::warn!(error = %e, "failed to save check-in");
            }
        }
        Event::DoAction {
            user_id,
            task_id,
            action: TaskAction::Complete,
            ..
        } if success => {
            match storage.set_candidate_status(user_id, task_id, CandidateStatus::Completed) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(task_id = %task_id, "completed item not found in store"),
                Err(e) => tracing::warn!(error = %e, "failed to mark item completed"),
            }
        }
        _ => {}
    }
}
