use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AgentDefinition;
use super::repository::AgentRepository;

/// Registry of the agents built at startup.
pub struct InMemoryAgentRepository {
    agents: RwLock<BTreeMap<String, AgentDefinition>>,
}

impl InMemoryAgentRepository {
    pub fn new(agents: impl IntoIterator<Item = AgentDefinition>) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| (agent.id.clone(), agent))
            .collect();
        Self {
            agents: RwLock::new(agents),
        }
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn list(&self) -> Vec<AgentDefinition> {
        self.agents.read().await.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<AgentDefinition> {
        self.agents.read().await.get(id).cloned()
    }
}
