//! Anthropic Messages API client.

use crate::config::ModelConfig;
use crate::error::LlmError;
use crate::llm::CompletionClient;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are an expert educational analyst helping TAs and instructors \
improve their course problem sets based on student feedback. \
Respond with a single valid JSON object and nothing else.";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'static str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Client for `POST {base_url}/v1/messages`.
pub struct AnthropicClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_seconds: u64,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
            retry: RetryPolicy::new(
                config.retries,
                Duration::from_millis(config.initial_retry_delay_ms),
            ),
        })
    }

    async fn send_once(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);

        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    LlmError::Connect(self.base_url.clone())
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let text: String = message
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::Malformed("no text content in response".to_string()));
        }

        Ok(text)
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!("Sending {} char prompt to {}", prompt.len(), self.model);
        self.retry
            .run("LLM request", || self.send_once(prompt), LlmError::is_retryable)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AnthropicClient {
        let config = ModelConfig {
            base_url: server.uri(),
            retries: 2,
            initial_retry_delay_ms: 1,
            ..ModelConfig::default()
        };
        AnthropicClient::new(&config, "test-key".to_string()).unwrap()
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        }))
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(text_response("{\"ok\": true}"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).complete("hello").await;
        assert_eq!(result.unwrap(), "{\"ok\": true}");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(text_response("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).complete("hello").await;
        assert_eq!(result.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn test_persistent_server_error_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).complete("hello").await.unwrap_err();
        match err {
            LlmError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("Internal Server Error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let err = client(&server).complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }
}
