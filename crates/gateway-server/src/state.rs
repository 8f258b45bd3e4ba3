//! Shared application state.

use gateway_config::GatewayConfig;
use gateway_core::{GatewayError, RequestValidator, TurnIdGenerator};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{RateLimitPolicy, RateLimiter};
use gateway_routing::GenerationDispatcher;
use gateway_telemetry::{Metrics, MetricsConfig, RequestLogger, DEFAULT_LOG_CAPACITY};
use std::sync::Arc;
use tracing::warn;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,
    /// Provider registry
    pub registry: Arc<ProviderRegistry>,
    /// Turn executor
    pub dispatcher: GenerationDispatcher,
    /// Request validator
    pub validator: Arc<RequestValidator>,
    /// Admission control
    pub limiter: Arc<RateLimiter>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Turn outcome recorder
    pub logger: RequestLogger,
    /// Stream turn ids
    pub turn_ids: Arc<TurnIdGenerator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("providers", &self.registry.provider_ids())
            .field("policy", self.limiter.policy())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a builder
    #[must_use]
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

/// Rate-limit policy described by the configuration
#[must_use]
pub fn rate_limit_policy(config: &GatewayConfig) -> RateLimitPolicy {
    config.provider_budgets().into_iter().fold(
        RateLimitPolicy::new(config.rate_limit.window, config.rate_limit.max_requests)
            .with_default_provider_max(config.rate_limit.provider_max_requests),
        |policy, (provider, budget)| policy.with_provider(provider, budget),
    )
}

/// Builder for [`AppState`]; anything not supplied is derived from the
/// configuration
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<GatewayConfig>,
    registry: Option<Arc<ProviderRegistry>>,
    limiter: Option<Arc<RateLimiter>>,
    metrics: Option<Metrics>,
    logger: Option<RequestLogger>,
}

impl AppStateBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the provider registry
    #[must_use]
    pub fn registry(mut self, registry: impl Into<Arc<ProviderRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Set the rate limiter
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Set the metrics
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the request logger
    #[must_use]
    pub fn logger(mut self, logger: RequestLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the state
    ///
    /// # Errors
    /// Returns error if the metrics cannot be registered
    pub fn build(self) -> Result<AppState, GatewayError> {
        let config = self.config.unwrap_or_default();

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ProviderRegistry::from_config(&config)));
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(rate_limit_policy(&config))));
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new(&MetricsConfig::default())
                .map_err(|e| GatewayError::internal(format!("failed to register metrics: {e}")))?,
        };
        let logger = self
            .logger
            .unwrap_or_else(|| default_logger(&metrics));

        Ok(AppState {
            validator: Arc::new(RequestValidator::new(config.limits.message_limits())),
            dispatcher: GenerationDispatcher::new(Arc::clone(&registry)),
            config: Arc::new(config),
            registry,
            limiter,
            metrics,
            logger,
            turn_ids: Arc::new(TurnIdGenerator::new()),
        })
    }
}

/// Logger drained by a background task when a runtime is available
fn default_logger(metrics: &Metrics) -> RequestLogger {
    if tokio::runtime::Handle::try_current().is_ok() {
        RequestLogger::spawn(DEFAULT_LOG_CAPACITY, Some(metrics.clone())).0
    } else {
        warn!("No async runtime, turn records will be discarded");
        RequestLogger::channel(1).0
    }
}
