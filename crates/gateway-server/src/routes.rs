//! Route definitions for the gateway API.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/:provider", get(handlers::provider_health_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Chat endpoints
        .route("/chat/:provider", post(handlers::chat))
        .route("/chat/:provider/stream", post(handlers::chat_stream))
        // Apply middleware; the last layer added runs first
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_headers_middleware,
        ))
        .layer(from_fn(middleware::logging_middleware))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer())
        .with_state(state)
}
