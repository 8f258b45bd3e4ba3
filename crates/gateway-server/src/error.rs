//! HTTP error responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{ErrorBody, GatewayError};
use serde_json::Value;
use tracing::{error, warn};

/// Error returned by handlers, rendered as `{ error, code, details? }`
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Stable error code
    pub code: &'static str,
    /// Human readable message
    pub message: String,
    /// Structured details
    pub details: Option<Value>,
    /// Seconds for the `Retry-After` header
    pub retry_after: Option<u64>,
}

impl ApiError {
    /// Create an error with an explicit status and code
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// 400 with `VALIDATION_ERROR`
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// 500 with `INTERNAL_ERROR`
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message.clone(),
            code: self.code.to_string(),
            details: self.details.clone(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &err {
            GatewayError::RateLimitExceeded { reset_seconds, .. } => Some((*reset_seconds).max(1)),
            _ => None,
        };

        Self {
            status,
            code: err.error_code(),
            message: err.to_string(),
            details: err.details(),
            retry_after,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                status = %self.status,
                code = self.code,
                error = %self.message,
                "Request failed"
            );
        } else {
            warn!(
                status = %self.status,
                code = self.code,
                error = %self.message,
                "Request rejected"
            );
        }

        let mut response = (self.status, Json(self.body())).into_response();
        if let Some(seconds) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rate_limit() {
        let err: ApiError = GatewayError::RateLimitExceeded {
            scope: "global".to_string(),
            limit: 5,
            reset_seconds: 42,
        }
        .into();

        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.retry_after, Some(42));

        let response = err.into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_from_invalid_model() {
        let err: ApiError = GatewayError::InvalidModel {
            provider: "alpha".to_string(),
            model: "A3".to_string(),
            valid_models: vec!["A1".to_string(), "A2".to_string()],
        }
        .into();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "INVALID_MODEL");
        assert_eq!(body["details"]["valid_models"], serde_json::json!(["A1", "A2"]));
    }

    #[test]
    fn test_unavailable_is_503() {
        let err: ApiError = GatewayError::provider_unavailable("gpt", "disabled").into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.retry_after.is_none());
    }
}
