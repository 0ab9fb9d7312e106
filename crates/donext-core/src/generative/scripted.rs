//! Replays canned replies in order.
//!
//! Used by tests and by hosts that want to exercise the generative path
//! without a network backend.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::{parse_structured, GenerativeBoundary};
use crate::error::GenerativeError;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<serde_json::Value, GenerativeError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn from_results(replies: Vec<Result<serde_json::Value, GenerativeError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn from_values(replies: Vec<serde_json::Value>) -> Self {
        Self::from_results(replies.into_iter().map(Ok).collect())
    }

    /// Raw model text; run through the same parser as the HTTP backend.
    pub fn from_texts(replies: Vec<&str>) -> Self {
        Self::from_results(replies.into_iter().map(parse_structured).collect())
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }
}

#[async_trait]
impl GenerativeBoundary for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GenerativeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                temperature,
                max_tokens,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| GenerativeError::Unavailable("script lock poisoned".into()))?
            .pop_front();
        next.unwrap_or_else(|| Err(GenerativeError::Unavailable("script exhausted".into())))
    }
}
