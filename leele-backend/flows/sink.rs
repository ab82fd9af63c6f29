use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;

use super::events::{AgentEvent, EventKind};

/// Per-request event channel between a flow run and its SSE response.
///
/// Backed by a bounded queue: `send` waits for space instead of dropping, so
/// a slow client slows the producer down but never loses chunks. Once the
/// receiver is gone, or after `close`, events are discarded.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    tx: Mutex<Option<mpsc::Sender<AgentEvent>>>,
    next_index: AtomicU64,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            inner: Arc::new(SinkInner {
                tx: Mutex::new(Some(tx)),
                next_index: AtomicU64::new(0),
            }),
        };
        (sink, rx)
    }

    fn slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<AgentEvent>>> {
        self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Best-effort delivery of one event. Never fails; drops are logged.
    pub async fn send(&self, kind: EventKind, message: impl Into<String>, message_id: Option<&str>) {
        let Some(tx) = self.slot().clone() else {
            tracing::debug!(%kind, "sink closed, event dropped");
            return;
        };

        let permit = match tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(%kind, "client disconnected, event dropped");
                return;
            }
        };

        permit.send(AgentEvent {
            kind,
            message: message.into(),
            message_id: message_id.map(String::from),
            sequence_index: self.inner.next_index.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
        });
    }

    /// Close the stream. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.slot().take().is_some()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    /// The receiving side has been dropped (client went away) or the sink is closed.
    pub fn is_disconnected(&self) -> bool {
        match self.slot().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}
