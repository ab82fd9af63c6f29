use std::sync::Arc;

use tokio::sync::mpsc;

use super::Flow;
use super::events::AgentEvent;
use super::executor::FlowExecutor;
use super::sink::EventSink;

/// Starts flow runs in the background, one sink per run.
#[derive(Debug, Clone, Copy)]
pub struct AgentExecutor {
    capacity: usize,
}

impl AgentExecutor {
    /// `capacity` bounds the events buffered per run before the flow waits on the client.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    /// Spawn `flow` on `input` and return the run's event stream. The stream
    /// ends once the run has finished and the sink is closed.
    pub fn launch(&self, flow: Arc<Flow>, input: String) -> mpsc::Receiver<AgentEvent> {
        let (sink, rx) = EventSink::channel(self.capacity);
        tokio::spawn(async move {
            FlowExecutor::new(sink).run(&flow, input).await;
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::StepOutput;
    use crate::flows::builder::{FlowBuilder, StepBuilder};
    use crate::flows::events::EventKind;

    #[tokio::test]
    async fn test_launch_streams_until_closed() {
        let flow = FlowBuilder::new()
            .name("Echo")
            .description("test")
            .step(StepBuilder::sequential("Echo", "echo", |input: StepOutput, _ctx| async move { Ok(input) }).status("Echoing..."))
            .build()
            .unwrap();

        let mut rx = AgentExecutor::new(1).launch(Arc::new(flow), "ping".into());
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push((event.kind, event.message));
        }
        assert_eq!(
            seen,
            vec![
                (EventKind::Status, "Echoing...".to_string()),
                (EventKind::Result, "ping".to_string()),
                (EventKind::Status, "Flow completed successfully!".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_panicking_step_still_ends_stream_with_error_status() {
        let flow = FlowBuilder::new()
            .name("Fragile")
            .description("test")
            .step(StepBuilder::sequential("Explode", "panics", |_input: StepOutput, _ctx| async {
                if true {
                    panic!("step blew up");
                }
                Ok(StepOutput::Empty)
            }))
            .on_error(|e| format!("handled: {e:#}"))
            .build()
            .unwrap();

        let mut rx = AgentExecutor::new(4).launch(Arc::new(flow), "go".into());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Status);
        assert!(events[0].message.starts_with("handled: "));
        assert!(events[0].message.ends_with("panicked: step blew up"));
    }
}
