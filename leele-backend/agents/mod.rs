pub mod catalog;
pub mod memory_repository;
pub mod repository;

use std::sync::Arc;

use serde::Serialize;

use crate::flows::Flow;
use crate::flows::adapter::{FlowAdapter, FlowSummary};

/// A servable agent use case: the route key it answers on and the flow it runs.
#[derive(Clone)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Error body returned when a request arrives without a prompt.
    pub empty_prompt_message: String,
    pub flow: Arc<Flow>,
}

impl AgentDefinition {
    pub fn new(id: impl Into<String>, empty_prompt_message: impl Into<String>, flow: Flow) -> Self {
        Self {
            id: id.into(),
            name: flow.name.clone(),
            description: flow.description.clone(),
            empty_prompt_message: empty_prompt_message.into(),
            flow: Arc::new(flow),
        }
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            flow: FlowAdapter::summarize(&self.flow),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub flow: FlowSummary,
}
