//! # Gateway Telemetry
//!
//! Observability for the LLM chat gateway.
//!
//! This crate provides:
//! - Structured logging setup
//! - Prometheus metrics
//! - Per-turn outcome recording off the response path

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;
pub mod request_log;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsConfig};
pub use request_log::{
    run_sink, RequestLogger, TurnOutcome, TurnRecord, TurnTimer, DEFAULT_LOG_CAPACITY,
};
