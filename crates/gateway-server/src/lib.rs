//! # Gateway Server
//!
//! HTTP server implementation for the LLM chat gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server with graceful shutdown
//! - Chat endpoints with JSON and server-sent event responses
//! - Gateway and per-provider health endpoints
//! - Middleware for request ids, logging, rate-limit headers and CORS

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sse;
pub mod state;

// Re-export main types
pub use error::ApiError;
pub use routes::create_router;
pub use server::{shutdown_signal, Server, ServerError};
pub use state::{rate_limit_policy, AppState, AppStateBuilder};
