//! In-process provider double for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    Completion, CompletionProvider, CompletionRequest, GenerationSettings, ProviderError, Role,
};

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync>;

/// Answers every request through a closure and records what it was asked.
/// Streamed replies are split into word-sized deltas.
pub struct ScriptedProvider {
    respond: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the user prompt.
    pub fn echo() -> Self {
        Self::new(|req| Ok(user_prompt(req).to_string()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn answer(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.answer(request)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let text = self.answer(request)?;
        let mut full = String::new();
        for piece in text.split_inclusive(' ') {
            full.push_str(piece);
            let _ = deltas.send(piece.to_string()).await;
        }
        Ok(full)
    }
}

pub fn system_prompt(request: &CompletionRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

pub fn user_prompt(request: &CompletionRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

pub fn completion(provider: Arc<ScriptedProvider>) -> Completion {
    Completion::new(
        provider,
        GenerationSettings {
            model: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: Some(256),
        },
    )
}
