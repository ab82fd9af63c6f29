//! OpenAI-compatible chat completions provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{CompletionProvider, CompletionRequest, ProviderError};
use crate::sse::{self, LineBuffer};

/// Error bodies are cut to this many bytes before they end up in events.
const MAX_ERROR_BODY: usize = 500;

pub struct OpenAiProvider {
    http_client: Arc<reqwest::Client>,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(
        http_client: Arc<reqwest::Client>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, request: &CompletionRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "completion request rejected");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded line of a streamed completion.
#[derive(Debug, PartialEq)]
pub enum StreamFrame {
    Delta(String),
    Done,
}

/// Decode a single SSE line. Non-data lines, empty deltas and frames that
/// fail to parse yield `None`.
pub fn decode_frame(line: &str) -> Option<StreamFrame> {
    let payload = sse::data_payload(line)?;
    if payload == "[DONE]" {
        return Some(StreamFrame::Done);
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(StreamFrame::Delta),
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self.post(request).await?;
        let body = response.text().await?;
        let completion: ChatCompletion =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let mut response = self.post(request).await?;
        let mut lines = LineBuffer::new();
        let mut full = String::new();
        let mut done = false;

        'read: while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                match decode_frame(&line) {
                    Some(StreamFrame::Done) => {
                        done = true;
                        break 'read;
                    }
                    Some(StreamFrame::Delta(text)) => {
                        full.push_str(&text);
                        // receiver gone means the client left; keep reading to return the full text
                        let _ = deltas.send(text).await;
                    }
                    None => {}
                }
            }
        }

        if !done {
            if let Some(StreamFrame::Delta(text)) = lines.finish().as_deref().and_then(decode_frame) {
                full.push_str(&text);
                let _ = deltas.send(text).await;
            }
            tracing::debug!("completion stream ended without [DONE]");
        }

        Ok(full)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
