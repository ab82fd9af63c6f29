use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, header};
use hyper::StatusCode;
use serde_json::Value;
use tower::ServiceExt;

use super::*;
use crate::agents::catalog;
use crate::agents::memory_repository::InMemoryAgentRepository;
use crate::flows::events::{AgentEvent, EventKind};
use crate::llm::testing::{self, ScriptedProvider};
use crate::sse::{LineBuffer, data_payload};

fn app(provider: Arc<ScriptedProvider>) -> Router {
    let agents = catalog::build(&testing::completion(provider)).unwrap();
    create_app(AppState {
        agent_repo: Arc::new(InMemoryAgentRepository::new(agents)),
        executor: AgentExecutor::new(16),
    })
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn sse_events(bytes: &[u8]) -> Vec<AgentEvent> {
    let mut lines = LineBuffer::new();
    let mut all = lines.push(bytes);
    all.extend(lines.finish());
    all.iter()
        .filter_map(|line| data_payload(line))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_agent_run_streams_events_in_order() {
    let provider = Arc::new(ScriptedProvider::new(|req| {
        Ok(format!("answer for {}", testing::user_prompt(req).len()))
    }));
    let response = app(provider)
        .oneshot(post_json("/api/agent", r#"{"userPrompt": "Explain recursion"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()[header::CONNECTION], "keep-alive");

    let events = sse_events(&body_bytes(response).await);
    let position = |kind| events.iter().position(|e: &AgentEvent| e.kind == kind).unwrap();
    assert!(position(EventKind::Status) < position(EventKind::Plan));
    assert!(position(EventKind::Plan) < position(EventKind::Result));

    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Status);
    assert_eq!(last.message, "Flow completed successfully!");

    let indices: Vec<_> = events.iter().map(|e| e.sequence_index).collect();
    let mut sorted = indices.clone();
    sorted.sort();
    assert_eq!(indices, sorted);
}

#[tokio::test]
async fn test_empty_prompt_is_rejected_without_running() {
    let provider = Arc::new(ScriptedProvider::echo());
    let app = app(provider.clone());

    for body in [r#"{"userPrompt": ""}"#, r#"{"userPrompt": "   "}"#, "{}", "not json"] {
        let response = app
            .clone()
            .oneshot(post_json("/api/creative-writer", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(json_body(response).await["error"], "Please provide a story topic!");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(post_json("/api/poet", r#"{"userPrompt": "hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_agents_includes_flow_summaries() {
    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(Request::get("/api/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let agents = body["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 5);

    let writer = agents.iter().find(|a| a["id"] == "creative-writer").unwrap();
    assert_eq!(writer["name"], "Creative Writer");
    let kinds: Vec<_> = writer["flow"]["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["sequential", "conditional", "goal-based", "parallel"]);
}

#[tokio::test]
async fn test_trailing_slash_redirects() {
    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(Request::get("/api/agents/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/api/agents");
}

#[tokio::test]
async fn test_http2_stream_omits_connection_header() {
    let mut request = post_json("/api/agent", r#"{"userPrompt": "Explain recursion"}"#);
    *request.version_mut() = axum::http::Version::HTTP_2;

    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONNECTION).is_none());
    body_bytes(response).await;
}

/// Collects the fields recorded on `request` spans.
#[derive(Clone, Default)]
struct RequestFields(Arc<Mutex<Vec<(String, String)>>>);

struct Collect<'a>(&'a mut Vec<(String, String)>);

impl tracing::field::Visit for Collect<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }
}

impl<S> tracing_subscriber::Layer<S> for RequestFields
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if attrs.metadata().name() == "request" {
            attrs.record(&mut Collect(&mut self.0.lock().unwrap()));
        }
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if ctx.metadata(id).is_some_and(|m| m.name() == "request") {
            values.record(&mut Collect(&mut self.0.lock().unwrap()));
        }
    }
}

#[tokio::test]
async fn test_request_span_records_path_and_status() {
    use tracing_subscriber::layer::SubscriberExt;

    let fields = RequestFields::default();
    let subscriber = tracing_subscriber::registry().with(fields.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let response = app(Arc::new(ScriptedProvider::echo()))
        .oneshot(Request::get("/api/agents/?page=2").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);

    let recorded = fields.0.lock().unwrap().clone();
    let value = |name: &str| {
        recorded
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    };
    assert_eq!(value("method").as_deref(), Some("GET"));
    assert_eq!(value("path").as_deref(), Some("/api/agents/"));
    assert_eq!(value("query").as_deref(), Some("\"page=2\""));
    assert_eq!(value("status").as_deref(), Some("308"));
}
