//! # Gateway Core
//!
//! Core types, traits, and error handling for the LLM chat gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Chat request, turn, and response types
//! - The provider capability trait and its descriptor
//! - Request validation and text sanitization
//! - Fragment streams and stream framing
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod request;
pub mod response;
pub mod sanitize;
pub mod streaming;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
pub use provider::{
    ChatProvider, GenerationRequest, HealthStatus, ProviderCapability, ProviderMessage,
    ProviderMessages,
};
pub use request::{ChatMessage, ChatRequest, ChatTurn, MessageRole};
pub use response::{
    ChatResponse, ChatResponseMetadata, ErrorBody, HealthResponse, ProviderHealthMetrics,
    ProviderHealthResponse,
};
pub use sanitize::sanitize_text;
pub use streaming::{chunk_words, frame, FragmentStream, StreamFrame, TurnIdGenerator};
pub use types::{Delivery, ProviderKind, ProviderStatus, GLOBAL_SCOPE};
pub use validation::{MessageLimits, RequestValidator};
