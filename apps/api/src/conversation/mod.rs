//! Conversation provider client: the voice agent service that hosts the live interview.
//!
//! The provider is reached only through the [`ConversationProvider`] trait so the session
//! lifecycle can be exercised against scripted doubles. [`ElevenLabsClient`] is the HTTP
//! implementation used in production.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::conversation::retry::Retryable;

pub mod retrieval;
pub mod retry;

/// Provider status reported while a finished conversation is still being processed.
pub const NOT_READY_STATUS: &str = "missing_conversation_audio";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("conversation artifacts not ready yet")]
    NotReady,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::NotReady | ProviderError::Http(_))
    }
}

#[async_trait]
pub trait ConversationProvider: Send + Sync {
    /// Downloads the full recording of a conversation.
    async fn get_audio(&self, conversation_id: &str) -> Result<Bytes, ProviderError>;

    /// Fetches the conversation document, which carries the `transcript` field.
    async fn get_conversation(&self, conversation_id: &str) -> Result<Value, ProviderError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ProviderError>;

    /// Returns a signed websocket URL the browser uses to open a live session with `agent_id`.
    async fn get_signed_url(&self, agent_id: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    detail: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProviderErrorDetail {
    Structured {
        status: Option<String>,
        message: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// HTTP client for the ElevenLabs conversational AI API.
#[derive(Clone)]
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.header("xi-api-key", &self.api_key).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }
}

/// Maps a non-success provider response onto the retry taxonomy.
fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    match detail {
        Some(ProviderErrorDetail::Structured {
            status: Some(detail_status),
            ..
        }) if detail_status == NOT_READY_STATUS => ProviderError::NotReady,
        Some(ProviderErrorDetail::Structured {
            message: Some(message),
            ..
        })
        | Some(ProviderErrorDetail::Text(message)) => ProviderError::Api {
            status: status.as_u16(),
            message,
        },
        _ => ProviderError::Api {
            status: status.as_u16(),
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl ConversationProvider for ElevenLabsClient {
    async fn get_audio(&self, conversation_id: &str) -> Result<Bytes, ProviderError> {
        let url = self.url(&format!("conversations/{conversation_id}/audio"));
        let response = self.send(self.client.get(url)).await?;
        let audio = response.bytes().await?;
        debug!("Downloaded {} audio bytes for {conversation_id}", audio.len());
        Ok(audio)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Value, ProviderError> {
        let url = self.url(&format!("conversations/{conversation_id}"));
        let response = self.send(self.client.get(url)).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("conversations/{conversation_id}"));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_signed_url(&self, agent_id: &str) -> Result<String, ProviderError> {
        let url = self.url("conversation/get-signed-url");
        let response = self
            .send(self.client.get(url).query(&[("agent_id", agent_id)]))
            .await?;
        let body: SignedUrlResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(body.signed_url)
    }
}
