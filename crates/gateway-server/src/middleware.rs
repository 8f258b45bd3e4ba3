//! HTTP middleware: request ids, request logging, rate-limit headers, CORS.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use gateway_core::GLOBAL_SCOPE;
use gateway_resilience::ScopeSnapshot;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::{extractors::RequestId, state::AppState};

/// Request id header
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const PROVIDER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-provider-limit");
const PROVIDER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-provider-remaining");
const PROVIDER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-provider-reset");

/// Propagate or assign a request id and echo it on the response
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Log method, path, status and latency of every request
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            "Request completed with server error"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            "Request completed"
        );
    }

    response
}

/// Attach the global and, for provider paths, per-provider rate-limit state
/// to every response.
///
/// Values are read after the handler ran, so they include the admission the
/// request itself consumed.
pub async fn rate_limit_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provider = provider_from_path(request.uri().path())
        .filter(|id| state.registry.contains(id))
        .map(str::to_string);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    insert_snapshot(
        headers,
        [LIMIT, REMAINING, RESET],
        state.limiter.snapshot(GLOBAL_SCOPE),
    );
    if let Some(provider) = provider {
        insert_snapshot(
            headers,
            [PROVIDER_LIMIT, PROVIDER_REMAINING, PROVIDER_RESET],
            state.limiter.snapshot(&provider),
        );
    }

    response
}

fn insert_snapshot(headers: &mut HeaderMap, names: [HeaderName; 3], snapshot: ScopeSnapshot) {
    let [limit, remaining, reset] = names;
    headers.insert(limit, HeaderValue::from(snapshot.limit));
    headers.insert(remaining, HeaderValue::from(snapshot.remaining));
    headers.insert(reset, HeaderValue::from(snapshot.reset_seconds));
}

/// Provider id named by `/chat/{provider}[/stream]` or `/health/{provider}`
fn provider_from_path(path: &str) -> Option<&str> {
    let mut segments = path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("chat" | "health"), Some(provider)) if !provider.is_empty() => Some(provider),
        _ => None,
    }
}

/// Permissive CORS: any origin, method and header
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
