//! Anthropic messages API client.

use crate::client::{self, ClientConfig};
use crate::sse;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use gateway_core::{
    ChatProvider, GatewayError, GenerationRequest, HealthStatus, MessageRole, ProviderKind,
};
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default Anthropic API base URL
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider
pub struct AnthropicProvider {
    config: ClientConfig,
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let client = config.http_client()?;
        let base_url = config.base_url_or(ANTHROPIC_BASE_URL);
        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    /// System messages go to the top-level `system` field; the rest keep
    /// their order.
    fn build_request(request: &GenerationRequest, stream: bool) -> AnthropicRequest<'_> {
        let mut system_parts = Vec::new();
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            match message.role {
                MessageRole::System => system_parts.push(message.content.as_str()),
                MessageRole::User => messages.push(AnthropicMessage {
                    role: "user",
                    content: &message.content,
                }),
                MessageRole::Assistant => messages.push(AnthropicMessage {
                    role: "assistant",
                    content: &message.content,
                }),
            }
        }

        AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
            temperature: request.temperature,
            stream,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn post(&self, body: &AnthropicRequest<'_>) -> RequestBuilder {
        self.authorized(self.client.post(format!("{}/messages", self.base_url)))
            .json(body)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            messages = request.messages.len(),
            "Sending messages request"
        );

        let body = Self::build_request(request, false);
        let response: AnthropicResponse =
            client::send_json(&self.config.id, self.post(&body)).await?;

        Ok(response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<String>())
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, GatewayError>>, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Sending streaming messages request"
        );

        let body = Self::build_request(request, true);
        let response = client::send(&self.config.id, self.post(&body)).await?;
        let provider = self.config.id.clone();
        let mut events = sse::event_stream(response, provider.clone());

        Ok(Box::pin(try_stream! {
            while let Some(event) = events.next().await {
                let event = event?;
                let parsed: AnthropicStreamEvent = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(
                            provider = %provider,
                            error = %e,
                            "Skipping unparseable stream event"
                        );
                        continue;
                    }
                };

                match parsed {
                    AnthropicStreamEvent::ContentBlockDelta { delta } => {
                        if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                            yield text;
                        }
                    }
                    AnthropicStreamEvent::MessageStop => break,
                    AnthropicStreamEvent::Error { error } => {
                        Err::<(), _>(GatewayError::provider(
                            provider.as_str(),
                            format!("{}: {}", error.kind, error.message),
                            None,
                            error.kind == "overloaded_error",
                        ))?;
                    }
                    AnthropicStreamEvent::Other => {}
                }
            }
        }))
    }

    async fn health_check(&self) -> HealthStatus {
        client::probe(self.authorized(self.client.get(format!("{}/models", self.base_url))))
            .await
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockDelta { delta: AnthropicDelta },
    MessageStop,
    Error { error: AnthropicError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ProviderMessage;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> AnthropicProvider {
        let config = ClientConfig::new("claude", SecretString::new("sk-ant".to_string()))
            .with_base_url(server.uri());
        AnthropicProvider::new(config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "claude-3-5-sonnet-latest".to_string(),
            messages: vec![
                ProviderMessage {
                    role: MessageRole::System,
                    content: "be brief".to_string(),
                },
                ProviderMessage {
                    role: MessageRole::User,
                    content: "hi".to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 128,
        }
    }

    #[test]
    fn test_system_lifted_to_top_level() {
        let req = request();
        let body = serde_json::to_value(AnthropicProvider::build_request(&req, false)).unwrap();
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_invoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({"system": "be brief", "max_tokens": 128})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "content": [{"type": "text", "text": "Hi there"}]
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).invoke(&request()).await.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn test_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: ping\ndata: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let fragments: Vec<String> = provider(&server)
            .stream(&request())
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let items: Vec<Result<String, GatewayError>> =
            provider(&server).stream(&request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
        assert!(err.is_retryable());
    }
}
