//! Provider capability abstraction.
//!
//! [`ProviderCapability`] is the read-only descriptor built from configuration
//! at startup; [`ChatProvider`] is the operation set every upstream client
//! implements, one implementation per [`ProviderKind`].

use crate::error::GatewayError;
use crate::request::MessageRole;
use crate::types::{Delivery, ProviderKind};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use std::time::Duration;

/// Descriptor of one configured provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCapability {
    /// Provider id (path segment in `/chat/{provider}`)
    pub id: String,
    /// Upstream kind
    pub kind: ProviderKind,
    /// Model used when the caller does not pin one
    pub default_model: String,
    /// Secondary model tried once when the primary fails
    pub fallback_model: String,
    /// Default sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Whether the provider is turned on
    pub enabled: bool,
    /// Whether a credential was found
    pub credential_present: bool,
    /// How fragments are produced in streaming mode
    pub delivery: Delivery,
    /// Upper bound for each upstream call
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ProviderCapability {
    /// The two model names callers may pin
    #[must_use]
    pub fn valid_models(&self) -> Vec<String> {
        vec![self.default_model.clone(), self.fallback_model.clone()]
    }

    /// Resolve the model to invoke for a requested model name.
    ///
    /// Empty or absent selects the default model; the default or fallback
    /// name is returned verbatim; anything else is [`GatewayError::InvalidModel`].
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, GatewayError> {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None => Ok(self.default_model.clone()),
            Some(model) if model == self.default_model || model == self.fallback_model => {
                Ok(model.to_string())
            }
            Some(model) => Err(GatewayError::InvalidModel {
                provider: self.id.clone(),
                model: model.to_string(),
                valid_models: self.valid_models(),
            }),
        }
    }

    /// Whether the provider can serve requests
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.enabled && self.credential_present
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

/// A message in provider-neutral form after adaptation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    /// Role understood by the target provider
    pub role: MessageRole,
    /// Text content
    pub content: String,
}

/// Adapted conversation for one provider
pub type ProviderMessages = Vec<ProviderMessage>;

/// Parameters of one upstream invocation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model to invoke
    pub model: String,
    /// Adapted conversation
    pub messages: ProviderMessages,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

/// Result of a provider health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream answered normally
    Healthy,
    /// Upstream answered but is throttling
    Degraded,
    /// Upstream unreachable or failing
    Unhealthy,
}

/// Operations every upstream provider exposes
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider id
    fn id(&self) -> &str;

    /// Provider kind
    fn kind(&self) -> ProviderKind;

    /// Generate the whole response
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, GatewayError>;

    /// Generate the response as a stream of text fragments.
    ///
    /// Dropping the returned stream cancels the upstream call.
    async fn stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, GatewayError>>, GatewayError>;

    /// Lightweight reachability probe
    async fn health_check(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha() -> ProviderCapability {
        ProviderCapability {
            id: "alpha".to_string(),
            kind: ProviderKind::OpenAI,
            default_model: "A1".to_string(),
            fallback_model: "A2".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            enabled: true,
            credential_present: true,
            delivery: Delivery::Native,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_resolve_model_defaults() {
        let cap = alpha();
        assert_eq!(cap.resolve_model(None).unwrap(), "A1");
        assert_eq!(cap.resolve_model(Some("")).unwrap(), "A1");
    }

    #[test]
    fn test_resolve_model_verbatim() {
        let cap = alpha();
        assert_eq!(cap.resolve_model(Some("A1")).unwrap(), "A1");
        assert_eq!(cap.resolve_model(Some("A2")).unwrap(), "A2");
    }

    #[test]
    fn test_resolve_model_invalid() {
        let err = alpha().resolve_model(Some("A3")).unwrap_err();
        match err {
            GatewayError::InvalidModel {
                model,
                valid_models,
                ..
            } => {
                assert_eq!(model, "A3");
                assert_eq!(valid_models, vec!["A1".to_string(), "A2".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_availability() {
        let mut cap = alpha();
        assert!(cap.is_available());
        cap.credential_present = false;
        assert!(!cap.is_available());
    }
}
