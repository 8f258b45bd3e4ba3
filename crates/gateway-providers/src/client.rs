//! Shared plumbing of the upstream HTTP clients.

use gateway_core::{GatewayError, HealthStatus};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, trace};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings of one upstream client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider id, used in errors and logs
    pub id: String,
    /// API key
    pub api_key: SecretString,
    /// Base URL override
    pub base_url: Option<String>,
    /// Upper bound for each call
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with the default timeout
    pub fn new(id: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            id: id.into(),
            api_key,
            base_url: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Point the client at another base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn http_client(&self) -> Result<Client, GatewayError> {
        Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))
    }
}

/// Map a transport error
pub(crate) fn request_error(provider: &str, e: &reqwest::Error) -> GatewayError {
    error!(provider = %provider, error = %e, "Upstream request failed");
    let message = if e.is_timeout() {
        format!("Request timed out: {e}")
    } else {
        format!("Request failed: {e}")
    };
    GatewayError::provider(provider, message, None, true)
}

/// Map an unsuccessful HTTP response
pub(crate) fn parse_error(provider: &str, status: u16, body: &str) -> GatewayError {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    let retryable = status == 408 || status == 429 || status >= 500;
    let message = serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| format!("HTTP {status}: {body}"),
        |parsed| format!("HTTP {status}: {}", parsed.error.message),
    );
    GatewayError::provider(provider, message, Some(status), retryable)
}

/// Send a request and return the response if its status is a success
pub(crate) async fn send(
    provider: &str,
    request: RequestBuilder,
) -> Result<Response, GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|e| request_error(provider, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(parse_error(provider, status.as_u16(), &body))
}

/// Send a request and decode its JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, GatewayError> {
    let response = send(provider, request).await?;
    let body = response.text().await.map_err(|e| {
        GatewayError::provider(provider, format!("Failed to read response: {e}"), None, true)
    })?;

    trace!(provider = %provider, body = %body, "Received upstream response");

    serde_json::from_str(&body).map_err(|e| {
        GatewayError::provider(provider, format!("Invalid response JSON: {e}"), None, false)
    })
}

/// Probe an endpoint for reachability
pub(crate) async fn probe(request: RequestBuilder) -> HealthStatus {
    match request.timeout(HEALTH_CHECK_TIMEOUT).send().await {
        Ok(response) if response.status().is_success() => HealthStatus::Healthy,
        Ok(response) if response.status().as_u16() == 429 => HealthStatus::Degraded,
        Ok(_) | Err(_) => HealthStatus::Unhealthy,
    }
}
