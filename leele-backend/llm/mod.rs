//! Completion provider abstraction.
//!
//! Flows talk to the LLM through [`Completion`], which owns the generation
//! defaults and a shared [`CompletionProvider`] handle constructed once in
//! `main` and injected into the agent catalog.

pub mod error;
pub mod openai;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

pub use error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Asks the provider for a JSON object instead of prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self { kind: "json_object" }
    }
}

/// Chat completion request body, serialized as-is for OpenAI-compatible APIs.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Single request/response completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Streamed completion. Each text delta is pushed into `deltas` as it
    /// arrives; the accumulated text is returned once the stream ends.
    /// A closed `deltas` receiver does not stop accumulation.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, ProviderError>;
}

/// Generation service used by flow steps.
#[derive(Clone)]
pub struct Completion {
    provider: Arc<dyn CompletionProvider>,
    settings: Arc<GenerationSettings>,
}

impl Completion {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: GenerationSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }

    fn request(&self, system: &str, user: &str, stream: bool, json: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: system.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: user.to_string(),
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream,
            response_format: json.then(ResponseFormat::json_object),
        }
    }

    pub async fn generate(&self, label: &str, system: &str, user: &str) -> Result<String> {
        tracing::debug!(label, provider = self.provider.name(), "completion requested");
        let request = self.request(system, user, false, false);
        let text = self
            .provider
            .complete(&request)
            .await
            .with_context(|| format!("failed to {label}"))?;
        tracing::debug!(label, chars = text.len(), "completion finished");
        Ok(text)
    }

    /// Completion in JSON response mode, deserialized into `T`.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        label: &str,
        system: &str,
        user: &str,
    ) -> Result<T> {
        tracing::debug!(label, provider = self.provider.name(), "json completion requested");
        let request = self.request(system, user, false, true);
        let text = self
            .provider
            .complete(&request)
            .await
            .with_context(|| format!("failed to {label}"))?;
        parse_json_reply(&text).with_context(|| format!("failed to {label}"))
    }

    pub async fn generate_stream(
        &self,
        label: &str,
        system: &str,
        user: &str,
        deltas: mpsc::Sender<String>,
    ) -> Result<String> {
        tracing::debug!(label, provider = self.provider.name(), "streamed completion requested");
        let request = self.request(system, user, true, false);
        let text = self
            .provider
            .complete_stream(&request, deltas)
            .await
            .with_context(|| format!("failed to {label}"))?;
        tracing::debug!(label, chars = text.len(), "streamed completion finished");
        Ok(text)
    }
}

/// Parse a JSON reply, tolerating a surrounding markdown code fence.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| ProviderError::Decode(e.to_string()))
}
