//! HTTP request handlers for the gateway API.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{
    frame, ChatRequest, ChatResponse, ChatResponseMetadata, ChatTurn, GatewayError,
    HealthResponse, HealthStatus, ProviderHealthMetrics, ProviderHealthResponse, ProviderStatus,
};
use gateway_telemetry::TurnTimer;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::{
    error::ApiError,
    extractors::{JsonBody, RequestId, StreamQuery},
    sse::sse_response,
    state::AppState,
};

/// Gateway health endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let providers: BTreeMap<_, _> = state.registry.statuses().into_iter().collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers,
    })
}

/// Provider health endpoint.
///
/// Enabled providers with a client are probed; `responseTime` is the probe
/// duration in seconds.
#[instrument(skip(state))]
pub async fn provider_health_check(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<ProviderHealthResponse>, ApiError> {
    let entry = state.registry.get(&provider).ok_or_else(|| {
        GatewayError::validation(
            format!("Invalid provider: {provider}"),
            Some("provider".to_string()),
            "unknown_provider",
        )
    })?;

    let status = entry.status();
    let client = match (&status, &entry.client) {
        (ProviderStatus::Ok, Some(client)) => client.clone(),
        _ => {
            return Ok(Json(ProviderHealthResponse {
                status,
                provider,
                metrics: ProviderHealthMetrics { response_time: 0.0 },
            }));
        }
    };

    let start = Instant::now();
    let probe = client.health_check().await;
    let response_time = start.elapsed().as_secs_f64();

    info!(
        provider = %provider,
        probe = ?probe,
        response_time,
        "Provider health check completed"
    );

    let status = match probe {
        HealthStatus::Healthy | HealthStatus::Degraded => ProviderStatus::Ok,
        HealthStatus::Unhealthy => ProviderStatus::Error,
    };

    Ok(Json(ProviderHealthResponse {
        status,
        provider,
        metrics: ProviderHealthMetrics { response_time },
    }))
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .gather()
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {e}")))?;

    let content_type = HeaderValue::from_str(&state.metrics.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static("text/plain; version=0.0.4"));

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// `POST /chat/{provider}`; streams when `?stream=true`
#[instrument(skip_all, fields(provider = %provider, request_id = %request_id))]
pub async fn chat(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    query: StreamQuery,
    RequestId(request_id): RequestId,
    JsonBody(body): JsonBody<ChatRequest>,
) -> Result<Response, ApiError> {
    run_turn(state, provider, body, query.stream).await
}

/// `POST /chat/{provider}/stream`
#[instrument(skip_all, fields(provider = %provider, request_id = %request_id))]
pub async fn chat_stream(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    RequestId(request_id): RequestId,
    JsonBody(body): JsonBody<ChatRequest>,
) -> Result<Response, ApiError> {
    run_turn(state, provider, body, true).await
}

/// Record a rejected turn and convert the error
fn reject(state: &AppState, timer: TurnTimer, err: GatewayError) -> ApiError {
    if let GatewayError::RateLimitExceeded { scope, .. } = &err {
        state.metrics.record_rate_limited(scope);
    }
    timer.fail(&err);
    err.into()
}

/// Resolve, validate and admit a turn, then execute it.
///
/// Nothing is charged against the rate limit for unavailable providers or
/// invalid requests.
async fn run_turn(
    state: AppState,
    provider: String,
    request: ChatRequest,
    streaming: bool,
) -> Result<Response, ApiError> {
    let turn = ChatTurn::new(&provider, request);
    let timer = state
        .logger
        .start_turn(&provider, turn.messages.len(), streaming);

    debug!(
        provider = %provider,
        model = ?turn.requested_model,
        messages = turn.messages.len(),
        streaming,
        "Processing chat request"
    );

    let resolved = match state.registry.resolve(&provider) {
        Ok(resolved) => resolved,
        Err(e) => return Err(reject(&state, timer, e)),
    };

    let turn = match state.validator.validate(turn, &resolved.capability) {
        Ok(turn) => turn,
        Err(e) => return Err(reject(&state, timer, e)),
    };

    if let Err(e) = state.limiter.admit_turn(&provider) {
        return Err(reject(&state, timer, e));
    }

    if streaming {
        let fragments = state.dispatcher.stream(turn, timer)?;
        let turn_id = state.turn_ids.next_id(&provider);
        debug!(provider = %provider, turn_id = %turn_id, "Streaming response");
        return Ok(sse_response(frame(turn_id, fragments)));
    }

    let completion = state.dispatcher.complete(turn, timer).await?;

    Ok(Json(ChatResponse {
        content: completion.content,
        metadata: Some(ChatResponseMetadata {
            provider,
            model: completion.model,
            fallback_used: completion.fallback_used,
        }),
    })
    .into_response())
}
