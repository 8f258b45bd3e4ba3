//! Generation dispatch with a single model fallback.
//!
//! A turn moves through `Resolving -> Invoking -> Succeeded`, or on failure
//! `Invoking -> FallbackInvoking -> {Succeeded, Failed}`. Resolution errors
//! end the turn immediately. The fallback is attempted at most once and is
//! skipped when the model that failed already is the fallback model.
//!
//! Streaming turns commit to a model once its first fragment arrives; a
//! failure after that ends the stream instead of switching models, so no
//! text is ever repeated.

use futures::stream::{BoxStream, StreamExt};
use gateway_core::{
    chunk_words, sanitize_text, ChatTurn, Delivery, FragmentStream, GatewayError,
    GenerationRequest,
};
use gateway_providers::{adapt, ProviderRegistry, ResolvedProvider};
use gateway_telemetry::TurnTimer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatch state of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Resolving provider and model
    Resolving,
    /// Calling the primary model
    Invoking,
    /// Calling the fallback model
    FallbackInvoking,
    /// Content produced
    Succeeded,
    /// Every attempt failed
    Failed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Invoking => "invoking",
            Self::FallbackInvoking => "fallback_invoking",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a non-streaming turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Sanitized response text
    pub content: String,
    /// Model that produced the text
    pub model: String,
    /// Whether the fallback model produced the text
    pub fallback_used: bool,
}

/// Everything needed to invoke a resolved turn
struct DispatchPlan {
    provider: ResolvedProvider,
    request: GenerationRequest,
    primary: String,
    fallback: Option<String>,
}

impl DispatchPlan {
    fn request_for(&self, model: &str) -> GenerationRequest {
        GenerationRequest {
            model: model.to_string(),
            ..self.request.clone()
        }
    }

    fn provider_id(&self) -> &str {
        &self.provider.capability.id
    }

    fn failure(
        &self,
        primary_error: &GatewayError,
        fallback: Option<(&str, &GatewayError)>,
    ) -> GatewayError {
        GatewayError::GenerationFailure {
            provider: self.provider_id().to_string(),
            primary_model: self.primary.clone(),
            primary_error: primary_error.to_string(),
            fallback_model: fallback.map(|(model, _)| model.to_string()),
            fallback_error: fallback.map(|(_, err)| err.to_string()),
        }
    }
}

/// Executes validated turns against the provider registry
#[derive(Debug, Clone)]
pub struct GenerationDispatcher {
    registry: Arc<ProviderRegistry>,
}

impl GenerationDispatcher {
    /// Create a dispatcher over a registry
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this dispatcher resolves against
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    fn transition(provider: &str, model: &str, state: DispatchState) {
        debug!(provider = %provider, model = %model, state = %state, "Dispatch state");
    }

    fn plan(&self, turn: &ChatTurn) -> Result<DispatchPlan, GatewayError> {
        Self::transition(
            &turn.provider_id,
            turn.requested_model().unwrap_or("-"),
            DispatchState::Resolving,
        );

        let provider = self.registry.resolve(&turn.provider_id)?;
        let capability = &provider.capability;
        let primary = ProviderRegistry::resolve_model(capability, turn.requested_model())?;
        let fallback = (primary != capability.fallback_model)
            .then(|| capability.fallback_model.clone());

        let request = GenerationRequest {
            model: primary.clone(),
            messages: adapt(&turn.messages, capability.kind),
            temperature: turn.temperature.unwrap_or(capability.temperature),
            max_tokens: capability.max_tokens,
        };

        Ok(DispatchPlan {
            provider,
            request,
            primary,
            fallback,
        })
    }

    /// Run a turn to completion.
    ///
    /// The timer records the outcome on every path.
    ///
    /// # Errors
    /// Returns the resolution error, or [`GatewayError::GenerationFailure`]
    /// naming every attempted model
    pub async fn complete(
        &self,
        turn: ChatTurn,
        mut timer: TurnTimer,
    ) -> Result<Completion, GatewayError> {
        let plan = match self.plan(&turn) {
            Ok(plan) => plan,
            Err(e) => {
                timer.fail(&e);
                return Err(e);
            }
        };

        timer.set_model(&plan.primary);
        Self::transition(plan.provider_id(), &plan.primary, DispatchState::Invoking);

        let primary_error = match invoke(&plan, &plan.primary).await {
            Ok(content) => {
                Self::transition(plan.provider_id(), &plan.primary, DispatchState::Succeeded);
                timer.succeed(&plan.primary, false);
                return Ok(Completion {
                    content,
                    model: plan.primary,
                    fallback_used: false,
                });
            }
            Err(e) => e,
        };

        warn!(
            provider = %plan.provider_id(),
            model = %plan.primary,
            error = %primary_error,
            fallback = ?plan.fallback,
            "Primary model failed"
        );

        let Some(fallback) = plan.fallback.clone() else {
            Self::transition(plan.provider_id(), &plan.primary, DispatchState::Failed);
            let err = plan.failure(&primary_error, None);
            timer.fail(&err);
            return Err(err);
        };

        timer.set_model(&fallback);
        Self::transition(plan.provider_id(), &fallback, DispatchState::FallbackInvoking);

        match invoke(&plan, &fallback).await {
            Ok(content) => {
                Self::transition(plan.provider_id(), &fallback, DispatchState::Succeeded);
                timer.succeed(&fallback, true);
                Ok(Completion {
                    content,
                    model: fallback,
                    fallback_used: true,
                })
            }
            Err(fallback_error) => {
                Self::transition(plan.provider_id(), &fallback, DispatchState::Failed);
                let err = plan.failure(&primary_error, Some((fallback.as_str(), &fallback_error)));
                timer.fail(&err);
                Err(err)
            }
        }
    }

    /// Start a streaming turn.
    ///
    /// Resolution happens immediately; the upstream call starts when the
    /// returned stream is first polled. Generation failures arrive as the
    /// stream's single error item.
    ///
    /// # Errors
    /// Returns the resolution error
    pub fn stream(&self, turn: ChatTurn, timer: TurnTimer) -> Result<FragmentStream, GatewayError> {
        let plan = match self.plan(&turn) {
            Ok(plan) => plan,
            Err(e) => {
                timer.fail(&e);
                return Err(e);
            }
        };

        let fragments = async_stream::stream! {
            let mut timer = timer;
            timer.set_model(&plan.primary);
            Self::transition(plan.provider_id(), &plan.primary, DispatchState::Invoking);

            let opened = match open(&plan, &plan.primary).await {
                Ok(opened) => Ok((plan.primary.clone(), false, opened)),
                Err(primary_error) => {
                    warn!(
                        provider = %plan.provider_id(),
                        model = %plan.primary,
                        error = %primary_error,
                        fallback = ?plan.fallback,
                        "Primary model failed before streaming"
                    );

                    match plan.fallback.clone() {
                        None => Err(plan.failure(&primary_error, None)),
                        Some(fallback) => {
                            timer.set_model(&fallback);
                            Self::transition(
                                plan.provider_id(),
                                &fallback,
                                DispatchState::FallbackInvoking,
                            );
                            match open(&plan, &fallback).await {
                                Ok(opened) => Ok((fallback, true, opened)),
                                Err(fallback_error) => Err(plan.failure(
                                    &primary_error,
                                    Some((fallback.as_str(), &fallback_error)),
                                )),
                            }
                        }
                    }
                }
            };

            let (model, fallback_used, (first, mut rest)) = match opened {
                Ok(opened) => opened,
                Err(err) => {
                    Self::transition(plan.provider_id(), &plan.primary, DispatchState::Failed);
                    timer.fail(&err);
                    yield Err(err);
                    return;
                }
            };

            if let Some(fragment) = first {
                yield Ok(fragment);
            }

            while let Some(item) = rest.next().await {
                match item {
                    Ok(fragment) => yield Ok(fragment),
                    Err(err) => {
                        warn!(
                            provider = %plan.provider_id(),
                            model = %model,
                            error = %err,
                            "Stream failed after output started"
                        );
                        Self::transition(plan.provider_id(), &model, DispatchState::Failed);
                        timer.fail(&err);
                        yield Err(err);
                        return;
                    }
                }
            }

            Self::transition(plan.provider_id(), &model, DispatchState::Succeeded);
            timer.succeed(model, fallback_used);
        };

        Ok(FragmentStream::new(fragments))
    }
}

async fn invoke(plan: &DispatchPlan, model: &str) -> Result<String, GatewayError> {
    let text = plan.provider.client.invoke(&plan.request_for(model)).await?;
    Ok(sanitize_text(&text))
}

/// Open the upstream for `model` and wait for its first fragment.
///
/// `Ok((None, _))` means the upstream finished without producing text.
async fn open(
    plan: &DispatchPlan,
    model: &str,
) -> Result<(Option<String>, BoxStream<'static, Result<String, GatewayError>>), GatewayError> {
    let request = plan.request_for(model);
    let upstream = match plan.provider.capability.delivery {
        Delivery::Native => plan.provider.client.stream(&request).await?,
        Delivery::Chunked => chunk_words(&plan.provider.client.invoke(&request).await?),
    };

    let mut fragments = sanitized(upstream);
    let first = fragments.next().await.transpose()?;
    Ok((first, fragments))
}

/// Sanitize each fragment and drop the ones left empty
fn sanitized(
    upstream: BoxStream<'static, Result<String, GatewayError>>,
) -> BoxStream<'static, Result<String, GatewayError>> {
    upstream
        .filter_map(|item| async move {
            match item {
                Ok(fragment) => {
                    let clean = sanitize_text(&fragment);
                    (!clean.is_empty()).then_some(Ok(clean))
                }
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}
