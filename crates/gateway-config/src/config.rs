//! Configuration types.

use crate::error::ConfigError;
use gateway_core::{Delivery, MessageLimits, ProviderCapability, ProviderKind, GLOBAL_SCOPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use validator::Validate;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    #[validate(nested)]
    pub server: ServerConfig,

    /// Message size limits
    #[validate(nested)]
    pub limits: LimitsConfig,

    /// Rate limiting
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Logging
    #[validate(nested)]
    pub logging: LoggingConfig,

    /// Upstream providers
    #[validate(nested)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            providers: default_providers(),
        }
    }
}

impl GatewayConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<yaml>".to_string(),
            message: e.to_string(),
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<toml>".to_string(),
            message: e.to_string(),
        })
    }

    /// Run field validation and the cross-field checks
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.limits.min_message_length > self.limits.max_message_length {
            return Err(ConfigError::Validation(format!(
                "limits.min_message_length ({}) exceeds limits.max_message_length ({})",
                self.limits.min_message_length, self.limits.max_message_length
            )));
        }

        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::Validation(
                "rate_limit.window must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.sweep_interval.is_some_and(|every| every.is_zero()) {
            return Err(ConfigError::Validation(
                "rate_limit.sweep_interval must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id == GLOBAL_SCOPE {
                return Err(ConfigError::Validation(format!(
                    "provider id '{GLOBAL_SCOPE}' is reserved for the global rate-limit scope"
                )));
            }
            if provider.id.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "provider id '{}' must not contain '/'",
                    provider.id
                )));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
            if provider.temperature > provider.kind.max_temperature() {
                return Err(ConfigError::Validation(format!(
                    "provider '{}' temperature {} exceeds the {} maximum of {}",
                    provider.id,
                    provider.temperature,
                    provider.kind,
                    provider.kind.max_temperature()
                )));
            }
            if let Some(base_url) = &provider.base_url {
                url::Url::parse(base_url).map_err(|e| {
                    ConfigError::Validation(format!(
                        "provider '{}' has an invalid base_url '{base_url}': {e}",
                        provider.id
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Look up a provider by id
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Per-provider rate-limit budgets
    #[must_use]
    pub fn provider_budgets(&self) -> HashMap<String, u32> {
        self.providers
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    p.rate_limit
                        .unwrap_or(self.rate_limit.provider_max_requests),
                )
            })
            .collect()
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    #[validate(length(min = 1))]
    pub host: String,

    /// Listen port
    #[validate(range(min = 1))]
    pub port: u16,

    /// Deployment environment name
    pub environment: String,

    /// Time allowed for in-flight requests on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3051,
            environment: "development".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Message size limits
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    /// Minimum trimmed content length
    #[validate(range(min = 1))]
    pub min_message_length: usize,

    /// Maximum trimmed content length
    #[validate(range(min = 1))]
    pub max_message_length: usize,

    /// Maximum number of messages per turn
    #[validate(range(min = 1))]
    pub max_messages: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = MessageLimits::default();
        Self {
            min_message_length: limits.min_length,
            max_message_length: limits.max_length,
            max_messages: limits.max_messages,
        }
    }
}

impl LimitsConfig {
    /// Limits in the form the validator consumes
    #[must_use]
    pub fn message_limits(&self) -> MessageLimits {
        MessageLimits {
            min_length: self.min_message_length,
            max_length: self.max_message_length,
            max_messages: self.max_messages,
        }
    }
}

/// Sliding-window rate limiting
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length shared by every scope
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Budget of the global scope
    #[validate(range(min = 1))]
    pub max_requests: u32,

    /// Budget of a provider scope without its own `rate_limit`
    #[validate(range(min = 1))]
    pub provider_max_requests: u32,

    /// How often idle scopes are dropped; disabled when absent
    #[serde(default, with = "humantime_serde::option")]
    pub sweep_interval: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_requests: 500,
            provider_max_requests: 200,
            sweep_interval: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `gateway_server=debug`
    #[validate(length(min = 1))]
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// One upstream provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    /// Provider id used in `/chat/{provider}`
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    /// Upstream API family
    pub kind: ProviderKind,

    /// Whether the provider serves requests
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key given inline
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Prefix of the per-provider environment overrides
    #[serde(default)]
    pub env_prefix: Option<String>,

    /// Model used when the caller does not pin one
    #[validate(length(min = 1))]
    pub default_model: String,

    /// Model tried once when the default fails
    #[validate(length(min = 1))]
    pub fallback_model: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    /// Override of the upstream API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Upper bound for each upstream call
    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// How fragments are produced in streaming mode
    #[serde(default)]
    pub delivery: Delivery,

    /// Budget of this provider's rate-limit scope
    #[serde(default)]
    #[validate(range(min = 1))]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    /// Create a provider with default parameters
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        default_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            api_key: None,
            api_key_env: None,
            env_prefix: None,
            default_model: default_model.into(),
            fallback_model: fallback_model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            timeout: default_provider_timeout(),
            delivery: Delivery::Native,
            rate_limit: None,
        }
    }

    /// Set the inline API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Set the API key environment variable
    #[must_use]
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    /// Set the override prefix
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the delivery mode
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the generation parameters
    #[must_use]
    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Enable or disable
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Prefix of the per-provider environment overrides (`OPENAI`, `GEMINI`, ...)
    #[must_use]
    pub fn env_prefix(&self) -> String {
        self.env_prefix
            .clone()
            .unwrap_or_else(|| self.id.to_ascii_uppercase().replace('-', "_"))
    }

    /// Whether a non-empty API key is configured
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Read-only descriptor used by the registry
    #[must_use]
    pub fn capability(&self) -> ProviderCapability {
        ProviderCapability {
            id: self.id.clone(),
            kind: self.kind,
            default_model: self.default_model.clone(),
            fallback_model: self.fallback_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            enabled: self.enabled,
            credential_present: self.has_credential(),
            delivery: self.delivery,
            timeout: self.timeout,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Providers configured when no file lists any
#[must_use]
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("gpt", ProviderKind::OpenAI, "gpt-4o", "gpt-4o-mini")
            .with_api_key_env("OPENAI_API_KEY")
            .with_env_prefix("OPENAI"),
        ProviderConfig::new(
            "claude",
            ProviderKind::Anthropic,
            "claude-3-5-sonnet-latest",
            "claude-3-5-haiku-latest",
        )
        .with_api_key_env("ANTHROPIC_API_KEY")
        .with_env_prefix("ANTHROPIC"),
        ProviderConfig::new(
            "gemini",
            ProviderKind::Google,
            "gemini-2.0-flash",
            "gemini-1.5-pro",
        )
        .with_api_key_env("GEMINI_API_KEY")
        .with_env_prefix("GEMINI")
        .with_delivery(Delivery::Chunked),
        ProviderConfig::new(
            "groq",
            ProviderKind::Groq,
            "llama-3.3-70b-versatile",
            "llama-3.1-8b-instant",
        )
        .with_api_key_env("GROQ_API_KEY")
        .with_env_prefix("GROQ")
        .with_generation(0.7, 2048)
        .with_enabled(false),
    ]
}
