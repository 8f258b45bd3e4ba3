//! # Gateway Config
//!
//! Configuration for the LLM chat gateway.
//!
//! Settings come from built-in defaults, an optional YAML or TOML file, and
//! environment variables, in that order of precedence. Configuration is read
//! once at startup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    default_providers, GatewayConfig, LimitsConfig, LogFormat, LoggingConfig, ProviderConfig,
    RateLimitConfig, ServerConfig,
};
pub use error::ConfigError;
pub use loader::{load_config, ConfigLoader, CONFIG_PATH_ENV};
