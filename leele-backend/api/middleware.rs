use axum::body::Body;
use axum::http::{Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::Instrument;
use tracing::field::Empty;

/// Wraps each request in a `request` span carrying method, path, host, query
/// and, once the response is ready, its status.
pub async fn request_span(req: Request<Body>, next: Next) -> Response {
    let uri: &Uri = req.uri();
    let host = req
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("UNKNOWN");

    let span = tracing::info_span!(
        "request",
        method = %req.method(),
        path = %uri.path(),
        host = %host,
        query = Empty,
        status = Empty,
    );
    if let Some(query) = uri.query() {
        span.record("query", query);
    }

    let response = next.run(req).instrument(span.clone()).await;
    span.record("status", response.status().as_u16());
    response
}

/// `/api/agents/` redirects to `/api/agents`. The root path is left alone.
pub async fn strip_trailing_slash(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();

    match uri.path().strip_suffix('/').filter(|p| !p.is_empty()) {
        Some(path) => {
            let target = match uri.query() {
                Some(query) => format!("{path}?{query}"),
                None => path.to_string(),
            };
            Redirect::permanent(&target).into_response()
        }
        None => next.run(req).await,
    }
}
