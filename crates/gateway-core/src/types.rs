//! Small shared domain types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rate-limit scope shared by every chat turn
pub const GLOBAL_SCOPE: &str = "global";

/// Closed set of upstream provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions
    OpenAI,
    /// Anthropic messages API
    Anthropic,
    /// Google Gemini (Generative Language API)
    Google,
    /// Groq (OpenAI-compatible API)
    Groq,
}

impl ProviderKind {
    /// Whether the provider accepts a distinct system role in multi-turn context
    #[must_use]
    pub fn supports_system_role(self) -> bool {
        !matches!(self, Self::Google)
    }

    /// Highest sampling temperature the upstream API accepts
    #[must_use]
    pub fn max_temperature(self) -> f32 {
        match self {
            Self::Anthropic => 1.0,
            Self::OpenAI | Self::Google | Self::Groq => 2.0,
        }
    }

    /// Lowercase name used in logs and configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Groq => "groq",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider delivers generated text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Upstream streams tokens as they are generated
    #[default]
    Native,
    /// Whole response is generated first, then split into word fragments
    Chunked,
}

/// Provider status as reported by the health endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Enabled, credentialed and initialized
    Ok,
    /// Turned off in configuration
    Disabled,
    /// Enabled but unusable (missing credential or client failure)
    Error,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Disabled => write!(f, "disabled"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_serde() {
        let kind: ProviderKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAI).unwrap(), "\"openai\"");
    }

    #[test]
    fn test_system_role_support() {
        assert!(ProviderKind::OpenAI.supports_system_role());
        assert!(ProviderKind::Anthropic.supports_system_role());
        assert!(!ProviderKind::Google.supports_system_role());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProviderStatus::Disabled.to_string(), "disabled");
        assert_eq!(
            serde_json::to_string(&ProviderStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
