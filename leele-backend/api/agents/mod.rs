pub mod handlers;

use axum::Router;
use axum::routing::{get, post};

use crate::api::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/{agent}", post(handlers::run_agent))
}
