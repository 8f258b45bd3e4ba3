//! # LLM Chat Gateway
//!
//! Multi-provider chat gateway: one HTTP surface in front of several LLM
//! providers, with request validation, sliding-window rate limiting, a single
//! model fallback per turn and SSE streaming.
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration (API keys from the environment)
//! OPENAI_API_KEY=sk-... llm-chat-gateway
//!
//! # Start with a config file
//! GATEWAY_CONFIG=/path/to/gateway.yaml llm-chat-gateway
//!
//! # Override settings from the environment
//! PORT=9000 LOG_FORMAT=json llm-chat-gateway
//! ```

use gateway_config::{load_config, GatewayConfig, LogFormat};
use gateway_providers::ProviderRegistry;
use gateway_resilience::{spawn_sweeper, RateLimiter};
use gateway_server::{rate_limit_policy, AppState, Server};
use gateway_telemetry::{
    init_logging, LoggingConfig, Metrics, MetricsConfig, RequestLogger, DEFAULT_LOG_CAPACITY,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Time allowed for the request log to drain after the server stops
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application entry point
#[tokio::main]
async fn main() {
    // Configuration decides the log format, so it is loaded first
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&logging_config(&config)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.server.environment,
        "Starting LLM Chat Gateway"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Application failed");
        std::process::exit(1);
    }
}

fn logging_config(config: &GatewayConfig) -> LoggingConfig {
    LoggingConfig::new()
        .with_level(&config.logging.level)
        .with_json(config.logging.format == LogFormat::Json)
}

/// Main application logic
async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        host = %config.server.host,
        port = config.server.port,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    let metrics = Metrics::new(&MetricsConfig::default())?;

    let registry = ProviderRegistry::from_config(&config);
    for (id, status) in registry.statuses() {
        info!(provider = %id, status = %status, "Provider registered");
    }
    if registry.provider_ids().iter().all(|id| registry.resolve(id).is_err()) {
        warn!("No provider can serve requests; check API keys and enabled flags");
    }

    let limiter = Arc::new(RateLimiter::new(rate_limit_policy(&config)));
    let sweeper = config
        .rate_limit
        .sweep_interval
        .map(|every| spawn_sweeper(Arc::clone(&limiter), every));

    let (logger, sink) = RequestLogger::spawn(DEFAULT_LOG_CAPACITY, Some(metrics.clone()));

    let state = AppState::builder()
        .config(config)
        .registry(registry)
        .limiter(limiter)
        .metrics(metrics)
        .logger(logger)
        .build()?;

    Server::new(state).run().await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if tokio::time::timeout(LOG_DRAIN_TIMEOUT, sink).await.is_err() {
        warn!("Request log did not drain before exit");
    }

    info!("Gateway shut down");
    Ok(())
}
