//! OpenAI-compatible chat completions backend.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{parse_structured, GenerativeBoundary};
use crate::config::GenerativeConfig;
use crate::error::GenerativeError;

const SYSTEM_PROMPT: &str =
    "You are a concise productivity assistant. Reply with a single JSON object and nothing else.";

pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Build from configuration, reading the API key from the configured
    /// environment variable (absent key is allowed for local backends).
    pub fn from_config(config: &GenerativeConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(config.endpoint.clone(), config.model.clone(), api_key)
    }
}

#[async_trait]
impl GenerativeBoundary for HttpGenerator {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<serde_json::Value, GenerativeError> {
        let body = json!({
            "model": self.model,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| GenerativeError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GenerativeError::Unavailable(format!("HTTP {}", resp.status())));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GenerativeError::Parse(e.to_string()))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerativeError::Parse("missing message content".into()))?;

        parse_structured(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> String {
        json!({
            "choices": [ { "message": { "role": "assistant", "content": content } } ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_parses_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("```json\n{\"chosen_id\": \"t1\"}\n```"))
            .create_async()
            .await;

        let gen = HttpGenerator::new(
            format!("{}/v1/chat/completions", server.url()),
            "test-model",
            Some("secret".into()),
        );
        let reply = gen.generate("pick one", 0.2, 100).await.unwrap();
        assert_eq!(reply["chosen_id"], "t1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(429)
            .create_async()
            .await;

        let gen = HttpGenerator::new(server.url(), "test-model", None);
        let err = gen.generate("pick one", 0.2, 100).await.unwrap_err();
        assert!(matches!(err, GenerativeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_prose_reply_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("I would pick the first one."))
            .create_async()
            .await;

        let gen = HttpGenerator::new(server.url(), "test-model", None);
        let err = gen.generate("pick one", 0.2, 100).await.unwrap_err();
        assert!(matches!(err, GenerativeError::Parse(_)));
    }
}
