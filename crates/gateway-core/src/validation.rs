//! Request validation.
//!
//! Runs before rate-limit admission, so a rejected turn never consumes quota.

use crate::error::GatewayError;
use crate::provider::ProviderCapability;
use crate::request::ChatTurn;
use serde::{Deserialize, Serialize};

/// Size limits applied to every turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLimits {
    /// Minimum trimmed content length, in characters
    pub min_length: usize,
    /// Maximum trimmed content length, in characters
    pub max_length: usize,
    /// Maximum number of messages in one turn
    pub max_messages: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 24_000,
            max_messages: 50,
        }
    }
}

/// Validates chat turns against [`MessageLimits`] and a provider's models
#[derive(Debug, Clone, Default)]
pub struct RequestValidator {
    limits: MessageLimits,
}

impl RequestValidator {
    /// Create a validator with the given limits
    #[must_use]
    pub fn new(limits: MessageLimits) -> Self {
        Self { limits }
    }

    /// Configured limits
    #[must_use]
    pub fn limits(&self) -> &MessageLimits {
        &self.limits
    }

    /// Validate a turn, returning it with trimmed message contents.
    ///
    /// # Errors
    /// Returns [`GatewayError::Validation`] for shape or size violations and
    /// [`GatewayError::InvalidModel`] when the pinned model is not offered.
    pub fn validate(
        &self,
        mut turn: ChatTurn,
        capability: &ProviderCapability,
    ) -> Result<ChatTurn, GatewayError> {
        if turn.messages.is_empty() {
            return Err(GatewayError::validation(
                "messages cannot be empty",
                Some("messages".to_string()),
                "empty_messages",
            ));
        }

        if turn.messages.len() > self.limits.max_messages {
            return Err(GatewayError::validation(
                format!(
                    "too many messages: {} (maximum {})",
                    turn.messages.len(),
                    self.limits.max_messages
                ),
                Some("messages".to_string()),
                "too_many_messages",
            ));
        }

        for (index, message) in turn.messages.iter_mut().enumerate() {
            let trimmed = message.content.trim();
            let length = trimmed.chars().count();

            if length < self.limits.min_length || length > self.limits.max_length {
                return Err(GatewayError::validation(
                    format!(
                        "message {index} has length {length}, expected between {} and {}",
                        self.limits.min_length, self.limits.max_length
                    ),
                    Some(format!("messages[{index}].content")),
                    "invalid_message_length",
                ));
            }

            if trimmed.len() != message.content.len() {
                message.content = trimmed.to_string();
            }
        }

        if let Some(temperature) = turn.temperature {
            let max = capability.kind.max_temperature();
            if !(0.0..=max).contains(&temperature) {
                return Err(GatewayError::validation(
                    format!(
                        "temperature must be between 0.0 and {max:.1} for {}, got {temperature}",
                        capability.kind
                    ),
                    Some("temperature".to_string()),
                    "invalid_temperature",
                ));
            }
        }

        capability.resolve_model(turn.requested_model())?;

        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ChatMessage, ChatRequest};
    use crate::types::{Delivery, ProviderKind};
    use std::time::Duration;

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

    fn turn(messages: Vec<ChatMessage>) -> ChatTurn {
        ChatTurn::new(
            "alpha",
            ChatRequest {
                messages,
                model: None,
                temperature: None,
            },
        )
    }

    fn small() -> RequestValidator {
        RequestValidator::new(MessageLimits {
            min_length: 1,
            max_length: 10,
            max_messages: 3,
        })
    }

    fn reason(err: &GatewayError) -> &str {
        match err {
            GatewayError::Validation { reason, .. } => reason,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_content_is_trimmed() {
        let validated = small()
            .validate(turn(vec![ChatMessage::user("  hello  ")]), &alpha())
            .unwrap();
        assert_eq!(validated.messages[0].content, "hello");
    }

    #[test]
    fn test_max_length_boundary() {
        let validator = small();
        let exact = "x".repeat(10);
        assert!(validator
            .validate(turn(vec![ChatMessage::user(exact)]), &alpha())
            .is_ok());

        let over = "x".repeat(11);
        let err = validator
            .validate(turn(vec![ChatMessage::user(over)]), &alpha())
            .unwrap_err();
        assert_eq!(reason(&err), "invalid_message_length");
    }

    #[test]
    fn test_length_counts_characters() {
        // ten characters, twenty bytes
        let accented = "é".repeat(10);
        assert!(small()
            .validate(turn(vec![ChatMessage::user(accented)]), &alpha())
            .is_ok());
    }

    #[test]
    fn test_whitespace_only_message_rejected() {
        let err = small()
            .validate(turn(vec![ChatMessage::user("   \n\t ")]), &alpha())
            .unwrap_err();
        assert_eq!(reason(&err), "invalid_message_length");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_max_messages_boundary() {
        let validator = small();
        let three = vec![ChatMessage::user("a"); 3];
        assert!(validator.validate(turn(three), &alpha()).is_ok());

        let four = vec![ChatMessage::user("a"); 4];
        let err = validator.validate(turn(four), &alpha()).unwrap_err();
        assert_eq!(reason(&err), "too_many_messages");
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = small().validate(turn(vec![]), &alpha()).unwrap_err();
        assert_eq!(reason(&err), "empty_messages");
    }

    #[test]
    fn test_temperature_range() {
        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.temperature = Some(2.5);
        let err = small().validate(t, &alpha()).unwrap_err();
        assert_eq!(reason(&err), "invalid_temperature");

        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.temperature = Some(0.0);
        assert!(small().validate(t, &alpha()).is_ok());
    }

    #[test]
    fn test_temperature_ceiling_follows_provider_kind() {
        let mut claude = alpha();
        claude.kind = ProviderKind::Anthropic;

        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.temperature = Some(1.5);
        let err = small().validate(t, &claude).unwrap_err();
        assert_eq!(reason(&err), "invalid_temperature");

        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.temperature = Some(1.0);
        assert!(small().validate(t, &claude).is_ok());

        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.temperature = Some(1.5);
        assert!(small().validate(t, &alpha()).is_ok());
    }

    #[test]
    fn test_unknown_model_is_invalid_model() {
        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.requested_model = Some("A3".to_string());
        let err = small().validate(t, &alpha()).unwrap_err();
        match err {
            GatewayError::InvalidModel { valid_models, .. } => {
                assert_eq!(valid_models, vec!["A1".to_string(), "A2".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pinned_fallback_model_is_valid() {
        let mut t = turn(vec![ChatMessage::user("hi")]);
        t.requested_model = Some("A2".to_string());
        assert!(small().validate(t, &alpha()).is_ok());
    }

    #[test]
    fn test_default_limits() {
        let limits = MessageLimits::default();
        assert_eq!(limits.min_length, 1);
        assert_eq!(limits.max_length, 24_000);
        assert_eq!(limits.max_messages, 50);
    }
}
