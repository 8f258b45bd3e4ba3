//! Response types for the gateway API.

use crate::types::ProviderStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Non-streaming chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text, sanitized
    pub content: String,
    /// Generation metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatResponseMetadata>,
}

/// Metadata attached to a chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseMetadata {
    /// Provider id
    pub provider: String,
    /// Model that produced the text
    pub model: String,
    /// Whether the fallback model answered
    pub fallback_used: bool,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message
    pub error: String,
    /// Stable error code
    pub code: String,
    /// Structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// `GET /health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,
    /// Gateway version
    pub version: String,
    /// Per-provider status
    pub providers: BTreeMap<String, ProviderStatus>,
}

/// `GET /health/{provider}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthResponse {
    /// Provider status
    pub status: ProviderStatus,
    /// Provider id
    pub provider: String,
    /// Probe timing
    pub metrics: ProviderHealthMetrics,
}

/// Timing of a provider health probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderHealthMetrics {
    /// Probe duration in seconds
    #[serde(rename = "responseTime")]
    pub response_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_skips_empty_details() {
        let body = ErrorBody {
            error: "Internal error".to_string(),
            code: "INTERNAL_ERROR".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_provider_health_serialization() {
        let response = ProviderHealthResponse {
            status: ProviderStatus::Ok,
            provider: "gpt".to_string(),
            metrics: ProviderHealthMetrics {
                response_time: 0.25,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["metrics"]["responseTime"], 0.25);
    }
}
