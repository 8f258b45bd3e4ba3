//! # Gateway Providers
//!
//! Upstream chat providers for the LLM chat gateway.
//!
//! This crate provides:
//! - The provider registry built from configuration
//! - Per-provider message adaptation
//! - HTTP clients for OpenAI (and the OpenAI-compatible Groq API),
//!   Anthropic, and Google Gemini

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod client;
pub mod registry;
pub mod sse;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "google")]
pub mod google;

// Re-export main types
pub use adapter::adapt;
pub use client::ClientConfig;
pub use registry::{ProviderEntry, ProviderRegistry, ProviderRegistryBuilder, ResolvedProvider};

#[cfg(feature = "openai")]
pub use openai::OpenAIProvider;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;

#[cfg(feature = "google")]
pub use google::GoogleProvider;
