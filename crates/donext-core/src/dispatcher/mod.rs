//! Event dispatcher.
//!
//! One [`Dispatcher::process`] call handles one event end to end: load
//! external state, run the handler for the event kind, persist best-effort,
//! return a [`Response`]. Nothing is carried over between calls; continuity
//! comes from re-reading storage.
//!
//! The host must serialize events per user. The dispatcher itself holds no
//! lock and keeps no per-user state.

mod handlers;
pub mod pipeline;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::agents::{CoachingAgent, MicroActionAgent, SelectionAgent};
use crate::config::Config;
use crate::error::{CoreError, StorageError};
use crate::events::{Event, EventKind, Response};
use crate::generative::{GenerativeBoundary, GenerativeContext};
use crate::storage::StorageAdapter;

/// Generic messages; raw errors only go to the log.
pub const ERR_NO_CANDIDATES: &str = "no candidates";
pub const ERR_NO_DATA: &str = "no data";
pub const ERR_UNKNOWN_USER: &str = "unknown user";
pub const ERR_UNKNOWN_EVENT: &str = "unknown event kind";
pub const ERR_INVALID_EVENT: &str = "invalid event";
pub const ERR_INTERNAL: &str = "internal error";

pub struct Dispatcher {
    storage: Arc<dyn StorageAdapter>,
    generator: Option<Arc<dyn GenerativeBoundary>>,
    config: Config,
    selector: SelectionAgent,
    coach: CoachingAgent,
    micro: MicroActionAgent,
}

impl Dispatcher {
    /// The generator is only consulted when `config.generative.enabled` is set.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        generator: Option<Arc<dyn GenerativeBoundary>>,
        config: Config,
    ) -> Self {
        Self {
            selector: SelectionAgent::new(config.generative.selection),
            coach: CoachingAgent::new(config.generative.coaching),
            micro: MicroActionAgent::new(config.generative.microtasks),
            storage,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn generative(&self) -> GenerativeContext<'_> {
        match (&self.generator, self.config.generative.enabled) {
            (Some(generator), true) => GenerativeContext::new(
                Some(generator.as_ref()),
                Duration::from_secs(self.config.generative.timeout_secs),
            ),
            _ => GenerativeContext::disabled(),
        }
    }

    /// Process one event. Never panics past this boundary and never returns
    /// a raw internal error string.
    pub async fn process(&self, event: Event) -> Response {
        let kind = event.kind();
        let user_id = event.user_id().to_string();
        let span = tracing::info_span!("event", event_kind = %kind, user_id = %user_id);

        async move {
            tracing::debug!("dispatching");
            match self.route(&event).await {
                Ok(data) => {
                    tracing::info!("event handled");
                    Response::ok(data)
                }
                Err(e) => {
                    tracing::error!(error = %e, "event failed");
                    let message = public_message(&e);
                    let now = event.timestamp().unwrap_or_else(Utc::now);
                    self.log_event(&user_id, &event, now, json!({ "error": message }));
                    Response::failure(message)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Process an event given as JSON.
    ///
    /// Unknown `type` values and malformed payloads become failure responses.
    pub async fn process_json(&self, value: serde_json::Value) -> Response {
        let type_tag = value.get("type").and_then(|t| t.as_str()).map(str::to_owned);
        let user_id = value.get("user_id").and_then(|u| u.as_str()).map(str::to_owned);
        if type_tag.as_deref().and_then(EventKind::parse).is_none() {
            tracing::warn!(event_type = ?type_tag, user_id = ?user_id, "unknown event kind");
            return Response::failure(ERR_UNKNOWN_EVENT);
        }
        match serde_json::from_value::<Event>(value) {
            Ok(event) => self.process(event).await,
            Err(e) => {
                tracing::warn!(event_type = ?type_tag, user_id = ?user_id, error = %e, "invalid event payload");
                Response::failure(ERR_INVALID_EVENT)
            }
        }
    }

    async fn route(&self, event: &Event) -> Result<Map<String, Value>, CoreError> {
        match event {
            Event::AppOpen { user_id, timestamp } => self.app_open(event, user_id, *timestamp).await,
            Event::CheckinSubmitted {
                user_id, timestamp, ..
            } => self.checkin_submitted(event, user_id, *timestamp).await,
            Event::DoNext {
                user_id,
                constraints,
                timestamp,
            } => {
                self.do_next(event, user_id, constraints.as_ref(), *timestamp)
                    .await
            }
            Event::DoAction {
                user_id,
                task_id,
                action,
                timestamp,
                actual_duration,
            } => {
                self.do_action(event, user_id, task_id, *action, *timestamp, *actual_duration)
                    .await
            }
            Event::DayEnd { user_id, timestamp } => self.day_end(event, user_id, *timestamp),
        }
    }

    /// Append the event plus an outcome record to the log. Best-effort.
    fn log_event(&self, user_id: &str, event: &Event, now: DateTime<Utc>, outcome: Value) {
        let mut payload = match serde_json::to_value(event) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => Map::new(),
        };
        if payload.get("timestamp").map_or(true, Value::is_null) {
            payload.insert("timestamp".into(), json!(now));
        }
        payload.insert("event_id".into(), json!(Uuid::new_v4()));
        payload.insert("outcome".into(), outcome);

        if let Err(e) = self
            .storage
            .append_event_log(user_id, event.kind(), &Value::Object(payload))
        {
            tracing::warn!(error = %e, "failed to append event log");
        }
    }
}

/// Map an internal error to the message the caller sees.
pub fn public_message(err: &CoreError) -> &'static str {
    match err {
        CoreError::NoCandidates => ERR_NO_CANDIDATES,
        CoreError::Storage(StorageError::UnknownUser(_)) => ERR_UNKNOWN_USER,
        CoreError::Storage(_) => ERR_NO_DATA,
        _ => ERR_INTERNAL,
    }
}
