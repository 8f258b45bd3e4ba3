//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::middleware::REQUEST_ID_HEADER;

/// Request id assigned by the request-id middleware, or read from the
/// incoming headers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }

        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .or_else(|| parts.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

        Ok(Self(id))
    }
}

/// JSON body extractor whose rejections use the gateway error shape
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {e}"))
                .with_details(serde_json::json!({ "reason": "invalid_json" }))
        })?;

        Ok(Self(value))
    }
}

/// `?stream` query flag.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` in any case; a bare `?stream`
/// means true. Anything else is a 400 in the gateway error shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamQuery {
    /// Stream the response as server-sent events
    pub stream: bool,
}

impl StreamQuery {
    fn parse(query: Option<&str>) -> Result<Self, ApiError> {
        let Some(query) = query else {
            return Ok(Self::default());
        };

        let value = query
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .filter(|(key, _)| *key == "stream")
            .map(|(_, value)| value)
            .last();

        let stream = match value.map(str::to_ascii_lowercase).as_deref() {
            None => false,
            Some("" | "true" | "1" | "yes") => true,
            Some("false" | "0" | "no") => false,
            Some(other) => {
                let details = serde_json::json!({
                    "field": "stream",
                    "reason": "invalid_stream_flag",
                });
                return Err(
                    ApiError::bad_request(format!("Invalid stream flag: {other}"))
                        .with_details(details),
                );
            }
        };

        Ok(Self { stream })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StreamQuery
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::parse(parts.uri.query())
    }
}
