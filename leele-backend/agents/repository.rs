use async_trait::async_trait;

use super::AgentDefinition;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// All agents, ordered by id.
    async fn list(&self) -> Vec<AgentDefinition>;
    async fn get(&self, id: &str) -> Option<AgentDefinition>;
}
