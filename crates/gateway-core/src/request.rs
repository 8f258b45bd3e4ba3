//! Request types for the gateway.
//!
//! [`ChatRequest`] is the wire body a client posts; [`ChatTurn`] is the same
//! request bound to the provider named in the path, owned by one request scope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat request body (`POST /chat/{provider}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,

    /// Model to use; must be the provider's default or fallback model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature override (0.0 - 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Chat message with role and content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message author
    pub role: MessageRole,

    /// Text content of the message
    pub content: String,

    /// Opaque caller metadata, never sent upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ChatMessage {
    /// Create a message with the given role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat exchange bound to a provider
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Provider id taken from the request path
    pub provider_id: String,
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// Model pinned by the caller, if any
    pub requested_model: Option<String>,
    /// Temperature override
    pub temperature: Option<f32>,
}

impl ChatTurn {
    /// Bind a request body to a provider
    #[must_use]
    pub fn new(provider_id: impl Into<String>, request: ChatRequest) -> Self {
        Self {
            provider_id: provider_id.into(),
            messages: request.messages,
            requested_model: request.model,
            temperature: request.temperature,
        }
    }

    /// Requested model, treating an empty string as "not requested"
    #[must_use]
    pub fn requested_model(&self) -> Option<&str> {
        self.requested_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let body = r#"{
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi", "metadata": {"client": "web"}}
            ],
            "model": "gpt-4o-mini"
        }"#;

        let request: ChatRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
        assert!(request.temperature.is_none());
        assert_eq!(
            request.messages[1].metadata.as_ref().unwrap()["client"],
            "web"
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        let body = r#"{"messages": [{"role": "tool", "content": "x"}]}"#;
        assert!(serde_json::from_str::<ChatRequest>(body).is_err());
    }

    #[test]
    fn test_empty_requested_model_is_none() {
        let turn = ChatTurn::new(
            "gpt",
            ChatRequest {
                messages: vec![ChatMessage::user("hi")],
                model: Some("  ".to_string()),
                temperature: None,
            },
        );
        assert_eq!(turn.requested_model(), None);
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("a").role, MessageRole::System);
        assert_eq!(ChatMessage::user("a").role, MessageRole::User);
        assert_eq!(ChatMessage::assistant("a").role, MessageRole::Assistant);
    }
}
