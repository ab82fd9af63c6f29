pub mod agents;
pub mod middleware;
mod routes;

use std::sync::Arc;

use axum::Router;

use crate::agents::repository::AgentRepository;
use crate::flows::agent::AgentExecutor;

#[derive(Clone)]
pub struct AppState {
    pub agent_repo: Arc<dyn AgentRepository>,
    /// Launches one background flow run per agent request.
    pub executor: AgentExecutor,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}

#[cfg(test)]
mod tests;
