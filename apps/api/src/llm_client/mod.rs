/// LLM client: the only place that talks to the Anthropic Messages API.
///
/// The interview judge is the sole consumer today; any future LLM feature goes through
/// here too so retries, model pinning and JSON extraction stay in one place.
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::conversation::retry::{retry, RetryPolicy, Retryable};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls. Pinned so scores stay comparable across sessions.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 1024;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::EmptyContent => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Text of the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            api_url: ANTHROPIC_API_URL.to_string(),
            // 1s, 2s between the three attempts
            policy: RetryPolicy::exponential(MAX_ATTEMPTS, Duration::from_secs(1)),
        }
    }

    /// Points the client at a stub Messages endpoint.
    #[cfg(test)]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Single-turn call at temperature 0. Retries 429, 5xx and transport failures.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = retry(&self.policy, "LLM call", |_| self.send_once(&body)).await?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            response.usage.input_tokens, response.usage.output_tokens
        );
        Ok(response)
    }

    async fn send_once(&self, body: &MessagesRequest<'_>) -> Result<LlmResponse, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Calls the model and deserializes its text reply as JSON.
    /// The prompt must ask for JSON only; surrounding code fences are tolerated.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        serde_json::from_str(strip_json_fences(text)).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    let inner = inner.trim_start();
    inner.strip_suffix("```").map(str::trim).unwrap_or(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"correctness\": 8}\n```";
        assert_eq!(strip_json_fences(input), "{\"correctness\": 8}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"correctness\": 8}\n```";
        assert_eq!(strip_json_fences(input), "{\"correctness\": 8}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        assert_eq!(strip_json_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let err = LlmError::Api {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!err.is_transient());
        assert!(LlmError::Api {
            status: 529,
            message: "overloaded".to_string()
        }
        .is_transient());
    }

    #[tokio::test]
    async fn test_call_json_parses_fenced_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "```json\n{\"recommendation\": \"Hire\"}\n```" }],
                "usage": { "input_tokens": 10, "output_tokens": 5 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new("test-key".to_string()).with_api_url(server.uri());
        let value: Value = client.call_json("prompt", "system").await.unwrap();
        assert_eq!(value["recommendation"], "Hire");
    }

    #[tokio::test]
    async fn test_call_surfaces_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new("bad".to_string()).with_api_url(server.uri());
        match client.call("prompt", "system").await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("expected API error, got {:?}", other.map(|_| ())),
        }
    }
}
