use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::EventKind;
use super::sink::EventSink;
use crate::llm::Completion;

/// Deltas buffered between a provider stream and the sink.
const CHUNK_BUFFER: usize = 64;

/// Handle given to each step invocation.
///
/// Carries a fresh correlation id; every chunk relayed through this context is
/// tagged with it so the client can stitch the message back together.
#[derive(Clone)]
pub struct StepContext {
    sink: EventSink,
    message_id: Arc<str>,
    request: Arc<str>,
}

impl StepContext {
    #[cfg(test)]
    pub fn new(sink: EventSink) -> Self {
        Self::for_request(sink, "")
    }

    /// Context for a run started on `request` (the user's prompt).
    pub fn for_request(sink: EventSink, request: impl Into<Arc<str>>) -> Self {
        Self {
            sink,
            message_id: Uuid::new_v4().to_string().into(),
            request: request.into(),
        }
    }

    /// Same sink and request, new correlation id.
    pub fn fork(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            message_id: Uuid::new_v4().to_string().into(),
            request: self.request.clone(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The prompt the run was started with.
    pub fn request(&self) -> &str {
        &self.request
    }

    pub async fn send(&self, kind: EventKind, text: impl Into<String>, message_id: Option<&str>) {
        self.sink.send(kind, text, message_id).await;
    }

    /// Send under this context's correlation id.
    pub async fn send_chunk(&self, kind: EventKind, text: impl Into<String>) {
        self.sink.send(kind, text, Some(&self.message_id)).await;
    }

    /// Run `produce` with a delta channel and forward every delta to the sink
    /// as a `kind` chunk while it runs. Returns whatever `produce` returns.
    pub async fn relay<F, Fut>(&self, kind: EventKind, produce: F) -> Result<String>
    where
        F: FnOnce(mpsc::Sender<String>) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let (tx, mut rx) = mpsc::channel::<String>(CHUNK_BUFFER);
        let forward = async {
            while let Some(delta) = rx.recv().await {
                self.send_chunk(kind, delta).await;
            }
        };
        let (text, ()) = tokio::join!(produce(tx), forward);
        text
    }

    /// Streamed completion relayed as `kind` chunks.
    pub async fn stream_completion(
        &self,
        completion: &Completion,
        kind: EventKind,
        label: &str,
        system: &str,
        user: &str,
    ) -> Result<String> {
        self.relay(kind, |tx| completion.generate_stream(label, system, user, tx))
            .await
    }
}
