//! # Gateway Routing
//!
//! Executes chat turns against the resolved provider for the LLM chat
//! gateway.
//!
//! This crate provides:
//! - Model resolution and message adaptation per turn
//! - A single fallback attempt on the provider's fallback model
//! - Native and chunked streaming delivery with per-fragment sanitization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;

// Re-export main types
pub use dispatcher::{Completion, DispatchState, GenerationDispatcher};
