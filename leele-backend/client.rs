//! `leele ask`: post a prompt to a running server and print the streamed reply.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::json;

use crate::flows::events::{AgentEvent, EventKind};
use crate::sse::{LineBuffer, data_payload};

/// One logical message, reassembled from the chunks sharing its message id.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: EventKind,
    pub message_id: Option<String>,
    pub text: String,
}

/// Events regrouped by message id, in order of each message's first chunk.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn push(&mut self, event: AgentEvent) {
        if let Some(id) = event.message_id.as_deref() {
            if let Some(existing) = self
                .messages
                .iter_mut()
                .find(|m| m.message_id.as_deref() == Some(id))
            {
                existing.text.push_str(&event.message);
                return;
            }
        }
        self.messages.push(Message {
            kind: event.kind,
            message_id: event.message_id,
            text: event.message,
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

pub async fn ask(server: &str, agent: &str, prompt: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let url = format!("{}/api/{agent}", server.trim_end_matches('/'));
    let mut response = client
        .post(&url)
        .json(&json!({ "userPrompt": prompt }))
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server returned {status}: {body}");
    }

    let mut lines = LineBuffer::new();
    let mut transcript = Transcript::default();
    while let Some(chunk) = response.chunk().await.context("stream interrupted")? {
        for line in lines.push(&chunk) {
            receive(&line, &mut transcript);
        }
    }
    if let Some(line) = lines.finish() {
        receive(&line, &mut transcript);
    }

    println!();
    for message in transcript.messages() {
        if message.kind != EventKind::Status {
            println!("[{}]\n{}\n", message.kind, message.text.trim());
        }
    }
    Ok(())
}

fn receive(line: &str, transcript: &mut Transcript) {
    let Some(payload) = data_payload(line) else {
        return;
    };
    match serde_json::from_str::<AgentEvent>(payload) {
        Ok(event) => {
            if event.kind == EventKind::Status {
                println!("… {}", event.message);
            }
            transcript.push(event);
        }
        Err(e) => tracing::debug!(error = %e, "skipping malformed event"),
    }
}
