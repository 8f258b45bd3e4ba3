//! Prometheus metrics.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric name prefix
    pub namespace: String,
    /// Duration histogram buckets, in seconds
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "gateway".to_string(),
            duration_buckets: vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
        }
    }
}

/// Gateway metrics, registered on a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    chat_requests_total: IntCounterVec,
    chat_duration_seconds: HistogramVec,
    fallbacks_total: IntCounterVec,
    rate_limited_total: IntCounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register all metrics
    ///
    /// # Errors
    /// Returns error if a metric cannot be created or registered
    pub fn new(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let chat_requests_total = IntCounterVec::new(
            Opts::new("chat_requests_total", "Chat turns by provider and outcome")
                .namespace(config.namespace.clone()),
            &["provider", "outcome"],
        )?;

        let chat_duration_seconds = HistogramVec::new(
            HistogramOpts::new("chat_duration_seconds", "Chat turn duration")
                .namespace(config.namespace.clone())
                .buckets(config.duration_buckets.clone()),
            &["provider"],
        )?;

        let fallbacks_total = IntCounterVec::new(
            Opts::new("fallbacks_total", "Turns served by the fallback model")
                .namespace(config.namespace.clone()),
            &["provider"],
        )?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests rejected by the rate limiter")
                .namespace(config.namespace.clone()),
            &["scope"],
        )?;

        registry.register(Box::new(chat_requests_total.clone()))?;
        registry.register(Box::new(chat_duration_seconds.clone()))?;
        registry.register(Box::new(fallbacks_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        Ok(Self {
            registry,
            chat_requests_total,
            chat_duration_seconds,
            fallbacks_total,
            rate_limited_total,
        })
    }

    /// Record a finished chat turn
    pub fn record_turn(
        &self,
        provider: &str,
        outcome: &str,
        duration_secs: f64,
        fallback_used: bool,
    ) {
        self.chat_requests_total
            .with_label_values(&[provider, outcome])
            .inc();
        self.chat_duration_seconds
            .with_label_values(&[provider])
            .observe(duration_secs);
        if fallback_used {
            self.fallbacks_total.with_label_values(&[provider]).inc();
        }
    }

    /// Record a rate-limit rejection
    pub fn record_rate_limited(&self, scope: &str) {
        self.rate_limited_total.with_label_values(&[scope]).inc();
    }

    /// Text exposition of all metrics
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type of [`Metrics::gather`] output
    #[must_use]
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = Metrics::new(&MetricsConfig::default()).unwrap();
        metrics.record_turn("gpt", "success", 0.25, true);
        metrics.record_turn("gpt", "failure", 1.5, false);
        metrics.record_rate_limited("global");

        let text = metrics.gather().unwrap();
        assert!(
            text.contains("gateway_chat_requests_total{outcome=\"success\",provider=\"gpt\"} 1")
        );
        assert!(
            text.contains("gateway_chat_requests_total{outcome=\"failure\",provider=\"gpt\"} 1")
        );
        assert!(text.contains("gateway_fallbacks_total{provider=\"gpt\"} 1"));
        assert!(text.contains("gateway_rate_limited_total{scope=\"global\"} 1"));
        assert!(text.contains("gateway_chat_duration_seconds_count{provider=\"gpt\"} 2"));
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new(&MetricsConfig::default()).unwrap();
        let b = Metrics::new(&MetricsConfig::default()).unwrap();
        a.record_rate_limited("gpt");
        assert!(!b.gather().unwrap().contains("scope=\"gpt\""));
    }

    #[test]
    fn test_content_type() {
        let metrics = Metrics::new(&MetricsConfig::default()).unwrap();
        assert!(metrics.content_type().starts_with("text/plain"));
    }
}
