use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{StatusCode, Version};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::agents::AgentDefinition;
use crate::api::AppState;

#[derive(Deserialize)]
pub(crate) struct PromptRequest {
    #[serde(rename = "userPrompt", default)]
    user_prompt: Option<String>,
}

pub(crate) async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let summaries: Vec<_> = state
        .agent_repo
        .list()
        .await
        .iter()
        .map(AgentDefinition::summary)
        .collect();

    Json(json!({ "agents": summaries }))
}

/// Start the agent's flow on the posted prompt and stream its events as SSE.
#[tracing::instrument(skip_all, fields(agent = %id))]
pub(crate) async fn run_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    version: Version,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let agent = state.agent_repo.get(&id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown agent '{id}'") })),
        )
    })?;

    let prompt = match body {
        Ok(Json(PromptRequest {
            user_prompt: Some(prompt),
        })) if !prompt.trim().is_empty() => prompt,
        Ok(_) => return Err(missing_prompt(&agent)),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected request body");
            return Err(missing_prompt(&agent));
        }
    };

    tracing::info!(chars = prompt.len(), "starting agent run");
    let mut rx = state.executor.launch(agent.flow.clone(), prompt);

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().data(data)),
                Err(e) => tracing::warn!(error = %e, kind = %event.kind, "failed to encode event"),
            }
        }
    };

    // connection-specific headers are forbidden in HTTP/2 and later
    let mut headers = HeaderMap::new();
    if version <= Version::HTTP_11 {
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    }

    Ok((
        headers,
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))),
    ))
}

fn missing_prompt(agent: &AgentDefinition) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": agent.empty_prompt_message })),
    )
}
