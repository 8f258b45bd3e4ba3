//! Error types for the gateway.
//!
//! Every failure a chat turn can hit maps onto one [`GatewayError`] variant,
//! which in turn carries its HTTP status and stable error code.

use serde_json::{json, Value};

/// Result alias used across the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// The request is malformed; the client must fix it
    #[error("Validation error: {message}")]
    Validation {
        /// Human readable description
        message: String,
        /// Offending field, if known
        field: Option<String>,
        /// Machine readable reason
        reason: String,
    },

    /// A rate-limit budget is exhausted
    #[error("Rate limit exceeded for scope '{scope}' ({limit} requests per window), retry in {reset_seconds}s")]
    RateLimitExceeded {
        /// Scope key (`global` or a provider id)
        scope: String,
        /// Budget of the scope
        limit: u32,
        /// Seconds until a slot frees up
        reset_seconds: u64,
    },

    /// Provider unknown, disabled, or missing its credential
    #[error("Provider '{provider}' is unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider id
        provider: String,
        /// Why it cannot serve requests
        reason: String,
    },

    /// The requested model is not offered by the provider
    #[error("Model '{model}' is not valid for {provider}. Valid models are: {}", valid_models.join(", "))]
    InvalidModel {
        /// Provider id
        provider: String,
        /// Model the caller asked for
        model: String,
        /// Default and fallback model names
        valid_models: Vec<String>,
    },

    /// A single upstream invocation failed
    #[error("Provider error from {provider}: {message}")]
    Provider {
        /// Provider id
        provider: String,
        /// Error description
        message: String,
        /// Upstream HTTP status, if any
        status_code: Option<u16>,
        /// Whether the upstream signalled a transient failure
        retryable: bool,
    },

    /// Generation failed on the primary model and, if attempted, the fallback
    #[error("{}", generation_failure_message(.primary_model, .primary_error, .fallback_model.as_deref(), .fallback_error.as_deref()))]
    GenerationFailure {
        /// Provider id
        provider: String,
        /// Model of the first attempt
        primary_model: String,
        /// Failure of the first attempt
        primary_error: String,
        /// Fallback model, when a fallback was attempted
        fallback_model: Option<String>,
        /// Failure of the fallback attempt
        fallback_error: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Unexpected fault
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

fn generation_failure_message(
    primary_model: &str,
    primary_error: &str,
    fallback_model: Option<&str>,
    fallback_error: Option<&str>,
) -> String {
    match (fallback_model, fallback_error) {
        (Some(model), Some(error)) => format!(
            "Generation failed: model '{primary_model}' failed ({primary_error}); fallback to '{model}' failed ({error})"
        ),
        _ => format!("Generation failed: model '{primary_model}' failed ({primary_error})"),
    }
}

impl GatewayError {
    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            reason: reason.into(),
        }
    }

    /// Create a provider (upstream) error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create a provider-unavailable error
    pub fn provider_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::InvalidModel { .. } => 400,
            Self::RateLimitExceeded { .. } => 429,
            Self::ProviderUnavailable { .. } => 503,
            Self::Provider { .. } => 502,
            Self::GenerationFailure { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                500
            }
        }
    }

    /// Stable machine readable error code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::InvalidModel { .. } => "INVALID_MODEL",
            Self::Provider { .. } => "UPSTREAM_ERROR",
            Self::GenerationFailure { .. } => "GENERATION_FAILED",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Structured details for the error response body
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation { field, reason, .. } => Some(json!({
                "field": field,
                "reason": reason,
            })),
            Self::RateLimitExceeded {
                scope,
                limit,
                reset_seconds,
            } => Some(json!({
                "scope": scope,
                "limit": limit,
                "reset_seconds": reset_seconds,
            })),
            Self::ProviderUnavailable { provider, .. } => Some(json!({ "provider": provider })),
            Self::InvalidModel {
                provider,
                valid_models,
                ..
            } => Some(json!({
                "provider": provider,
                "valid_models": valid_models,
            })),
            Self::Provider {
                provider,
                status_code,
                ..
            } => Some(json!({
                "provider": provider,
                "status_code": status_code,
            })),
            Self::GenerationFailure {
                provider,
                primary_model,
                primary_error,
                fallback_model,
                fallback_error,
            } => Some(json!({
                "provider": provider,
                "primary": { "model": primary_model, "error": primary_error },
                "fallback": fallback_model.as_ref().map(|model| json!({
                    "model": model,
                    "error": fallback_error,
                })),
            })),
            Self::Configuration { .. } | Self::Internal { .. } => None,
        }
    }

    /// Whether the upstream marked this failure as transient
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::validation("bad", None, "bad").status_code(),
            400
        );
        assert_eq!(
            GatewayError::RateLimitExceeded {
                scope: "global".into(),
                limit: 1,
                reset_seconds: 3
            }
            .status_code(),
            429
        );
        assert_eq!(
            GatewayError::provider_unavailable("gpt", "disabled").status_code(),
            503
        );
        assert_eq!(GatewayError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_invalid_model_names_valid_choices() {
        let err = GatewayError::InvalidModel {
            provider: "alpha".into(),
            model: "A3".into(),
            valid_models: vec!["A1".into(), "A2".into()],
        };
        let message = err.to_string();
        assert!(message.contains("A1"));
        assert!(message.contains("A2"));
        assert_eq!(err.error_code(), "INVALID_MODEL");
        assert_eq!(err.details().unwrap()["valid_models"][1], "A2");
    }

    #[test]
    fn test_generation_failure_names_both_attempts() {
        let err = GatewayError::GenerationFailure {
            provider: "alpha".into(),
            primary_model: "A1".into(),
            primary_error: "connection reset".into(),
            fallback_model: Some("A2".into()),
            fallback_error: Some("HTTP 500".into()),
        };
        let message = err.to_string();
        assert!(message.contains("'A1'"));
        assert!(message.contains("connection reset"));
        assert!(message.contains("'A2'"));
        assert!(message.contains("HTTP 500"));
    }

    #[test]
    fn test_generation_failure_without_fallback() {
        let err = GatewayError::GenerationFailure {
            provider: "alpha".into(),
            primary_model: "A2".into(),
            primary_error: "timeout".into(),
            fallback_model: None,
            fallback_error: None,
        };
        assert!(!err.to_string().contains("fallback"));
        assert!(err.details().unwrap()["fallback"].is_null());
    }

    #[test]
    fn test_retryable() {
        assert!(GatewayError::provider("gpt", "503", Some(503), true).is_retryable());
        assert!(!GatewayError::internal("x").is_retryable());
    }
}
