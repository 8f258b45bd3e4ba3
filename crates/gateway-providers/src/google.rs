//! Google Gemini provider implementation.
//!
//! Uses the Generative Language API:
//! `{BASE}/models/{MODEL}:generateContent?key=...` and
//! `{BASE}/models/{MODEL}:streamGenerateContent?alt=sse&key=...`.
//!
//! Gemini has no system role in multi-turn contents; conversations reach
//! this client already adapted, so any leftover system message is sent as
//! user content.

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
use tracing::debug;

/// Default Generative Language API base URL
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider
pub struct GoogleProvider {
    config: ClientConfig,
    client: Client,
    base_url: String,
}

impl GoogleProvider {
    /// Create a new Google provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let client = config.http_client()?;
        let base_url = config.base_url_or(GOOGLE_BASE_URL);
        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    fn endpoint(&self, model: &str, streaming: bool) -> RequestBuilder {
        let action = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };

        let mut builder = self
            .client
            .post(format!("{}/models/{model}:{action}", self.base_url));
        if streaming {
            builder = builder.query(&[("alt", "sse")]);
        }
        builder.query(&[("key", self.config.api_key.expose_secret().as_str())])
    }

    fn build_request(request: &GenerationRequest) -> GoogleRequest<'_> {
        GoogleRequest {
            contents: request
                .messages
                .iter()
                .map(|m| GoogleContent {
                    role: match m.role {
                        MessageRole::Assistant => "model",
                        MessageRole::User | MessageRole::System => "user",
                    },
                    parts: vec![GooglePart { text: &m.content }],
                })
                .collect(),
            generation_config: GoogleGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    /// Text of the first candidate
    fn candidate_text(provider: &str, response: GoogleResponse) -> Result<String, GatewayError> {
        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(GatewayError::provider(
                provider,
                format!("Empty response: {reason}"),
                None,
                false,
            ));
        };

        Ok(candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            messages = request.messages.len(),
            "Sending generateContent request"
        );

        let body = Self::build_request(request);
        let response: GoogleResponse = client::send_json(
            &self.config.id,
            self.endpoint(&request.model, false).json(&body),
        )
        .await?;

        Self::candidate_text(&self.config.id, response)
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<String, GatewayError>>, GatewayError> {
        debug!(
            provider = %self.config.id,
            model = %request.model,
            "Sending streamGenerateContent request"
        );

        let body = Self::build_request(request);
        let response =
            client::send(&self.config.id, self.endpoint(&request.model, true).json(&body)).await?;
        let provider = self.config.id.clone();
        let mut events = sse::event_stream(response, provider.clone());

        Ok(Box::pin(try_stream! {
            while let Some(event) = events.next().await {
                let event = event?;
                let chunk: GoogleResponse = serde_json::from_str(&event.data).map_err(|e| {
                    GatewayError::provider(
                        provider.as_str(),
                        format!("Invalid stream chunk: {e}"),
                        None,
                        false,
                    )
                })?;
                let text = Self::candidate_text(&provider, chunk)?;
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
                .query(&[("key", self.config.api_key.expose_secret().as_str())]),
        )
        .await
    }
}

// Google API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest<'a> {
    contents: Vec<GoogleContent<'a>>,
    generation_config: GoogleGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GoogleContent<'a> {
    role: &'static str,
    parts: Vec<GooglePart<'a>>,
}

#[derive(Debug, Serialize)]
struct GooglePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GooglePromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GoogleResponseContent {
    #[serde(default)]
    parts: Vec<GoogleResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GoogleResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ProviderMessage;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GoogleProvider {
        let config = ClientConfig::new("gemini", SecretString::new("g-key".to_string()))
            .with_base_url(server.uri());
        GoogleProvider::new(config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.0-flash".to_string(),
            messages: vec![
                ProviderMessage {
                    role: MessageRole::User,
                    content: "be brief\n\nhi".to_string(),
                },
                ProviderMessage {
                    role: MessageRole::Assistant,
                    content: "hello".to_string(),
                },
            ],
            temperature: 0.5,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_request_roles() {
        let req = request();
        let body = serde_json::to_value(GoogleProvider::build_request(&req)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "be brief\n\nhi");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[tokio::test]
    async fn test_invoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "world"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).invoke(&request()).await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn test_invoke_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).invoke(&request()).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
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
    async fn test_health_check_rate_limited_is_degraded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).health_check().await, HealthStatus::Degraded);
    }
}
