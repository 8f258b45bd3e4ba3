//! OpenAI chat completions client.
//!
//! Also serves Groq, whose API is OpenAI-compatible.

use crate::client::{self, ClientConfig};
use crate::sse;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use gateway_core::{
    ChatProvider, GatewayError, GenerationRequest, HealthStatus, MessageRole, ProviderKind,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Groq API base URL
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    config: ClientConfig,
    kind: ProviderKind,
    client: Client,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a client for OpenAI or Groq
    ///
    /// # Errors
    /// Returns error if `kind` is not OpenAI-compatible or the HTTP client
    /// cannot be created
    pub fn new(config: ClientConfig, kind: ProviderKind) -> Result<Self, GatewayError> {
        let default_base = match kind {
            ProviderKind::OpenAI => OPENAI_BASE_URL,
            ProviderKind::Groq => GROQ_BASE_URL,
            other => {
                return Err(GatewayError::configuration(format!(
                    "{other} is not an OpenAI-compatible provider"
                )))
            }
        };

        let client = config.http_client()?;
        let base_url = config.base_url_or(default_base);

        Ok(Self {
            config,
            kind,
            client,
            base_url,
        })
    }

    fn build_request(request: &GenerationRequest, stream: bool) -> OpenAIRequest<'_> {
        OpenAIRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: role_name(m.role),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }

    fn post(&self, body: &OpenAIRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let body = Self::build_request(request, false);
        let response: OpenAIResponse = client::send_json(&self.config.id, self.post(&body)).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GatewayError::provider(
                    &self.config.id,
                    "Response contained no choices",
                    None,
                    false,
                )
            })
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, GatewayError>>, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Sending streaming chat completion request"
        );

        let body = Self::build_request(request, true);
        let response = client::send(&self.config.id, self.post(&body)).await?;
        let provider = self.config.id.clone();
        let mut events = sse::event_stream(response, provider.clone());

        Ok(Box::pin(try_stream! {
            while let Some(event) = events.next().await {
                let event = event?;
                if event.data == "[DONE]" {
                    break;
                }

                let chunk: OpenAIStreamChunk = serde_json::from_str(&event.data).map_err(|e| {
                    GatewayError::provider(
                        provider.as_str(),
                        format!("Invalid stream chunk: {e}"),
                        None,
                        false,
                    )
                })?;

                if let Some(error) = chunk.error {
                    let message = error.message;
                    Err::<(), _>(GatewayError::provider(provider.as_str(), message, None, false))?;
                }

                let text = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .unwrap_or_default();
                if !text.is_empty() {
                    yield text;
                }
            }
        }))
    }

    async fn health_check(&self) -> HealthStatus {
        client::probe(
            self.client
                .get(format!("{}/models", self.base_url))
                .bearer_auth(self.config.api_key.expose_secret()),
        )
        .await
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIStreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamError {
    message: String,
}
