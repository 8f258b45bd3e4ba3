//! # Gateway Resilience
//!
//! Admission control for the LLM chat gateway:
//! - Sliding-window request counting with per-key locking
//! - Two-scope (global and per-provider) admission of chat turns
//! - Optional background sweep of idle scopes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod rate_limiter;

// Re-export main types
pub use admission::{spawn_sweeper, RateLimitPolicy, RateLimiter, ScopeSnapshot};
pub use rate_limiter::{SlidingWindowLimiter, WindowStatus};
