//! Chat turn outcome recording.
//!
//! Handlers and the dispatcher never wait on logging: records are pushed onto
//! a bounded channel with `try_send` and consumed by a background task that
//! emits one structured event per turn and updates the metrics.

use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use gateway_core::GatewayError;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default channel capacity
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    /// Content delivered
    Success,
    /// Turn failed with an error
    Failure,
    /// Caller went away before the turn finished
    Cancelled,
}

impl TurnOutcome {
    /// Label value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    /// Provider id from the request path
    pub provider: String,
    /// Model that produced (or failed to produce) the answer, once known
    pub model: Option<String>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Elapsed time
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Messages in the request
    pub message_count: usize,
    /// Whether the turn was streamed
    pub streaming: bool,
    /// Whether the fallback model was used
    pub fallback_used: bool,
    /// Outcome
    pub outcome: TurnOutcome,
    /// Error code for failed turns
    pub error_code: Option<&'static str>,
    /// Error message for failed turns
    pub error: Option<String>,
}

fn serialize_millis<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Non-blocking sender of turn records
#[derive(Clone)]
pub struct RequestLogger {
    tx: mpsc::Sender<TurnRecord>,
    dropped: Arc<AtomicU64>,
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl RequestLogger {
    /// Create a logger and the receiving end of its channel
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TurnRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Create a logger whose records are consumed by a background task.
    ///
    /// The task ends once every logger clone has been dropped.
    #[must_use]
    pub fn spawn(capacity: usize, metrics: Option<Metrics>) -> (Self, JoinHandle<()>) {
        let (logger, rx) = Self::channel(capacity);
        let handle = tokio::spawn(run_sink(rx, metrics));
        (logger, handle)
    }

    /// Queue a record; drops it if the channel is full
    pub fn record(&self, record: TurnRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    provider = %record.provider,
                    outcome = %record.outcome,
                    dropped,
                    "Request log channel full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Start timing a turn
    #[must_use]
    pub fn start_turn(
        &self,
        provider: impl Into<String>,
        message_count: usize,
        streaming: bool,
    ) -> TurnTimer {
        TurnTimer {
            logger: self.clone(),
            provider: provider.into(),
            model: None,
            started: Instant::now(),
            started_at: Utc::now(),
            message_count,
            streaming,
            finished: false,
        }
    }

    /// Records lost to a full or closed channel
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consume records until every sender is gone
pub async fn run_sink(mut rx: mpsc::Receiver<TurnRecord>, metrics: Option<Metrics>) {
    while let Some(record) = rx.recv().await {
        if let Some(metrics) = &metrics {
            metrics.record_turn(
                &record.provider,
                record.outcome.as_str(),
                record.duration.as_secs_f64(),
                record.fallback_used,
            );
        }

        info!(
            target: "chat_turn",
            provider = %record.provider,
            model = record.model.as_deref().unwrap_or("-"),
            started_at = %record.started_at.to_rfc3339(),
            duration_ms = record.duration.as_millis() as u64,
            message_count = record.message_count,
            streaming = record.streaming,
            fallback_used = record.fallback_used,
            outcome = %record.outcome,
            error_code = record.error_code.unwrap_or("-"),
            error = record.error.as_deref().unwrap_or("-"),
            "Chat turn finished"
        );
    }
}

/// Scoped timer for one turn.
///
/// Exactly one record is produced: by [`TurnTimer::succeed`],
/// [`TurnTimer::fail`], or on drop as cancelled.
pub struct TurnTimer {
    logger: RequestLogger,
    provider: String,
    model: Option<String>,
    started: Instant,
    started_at: DateTime<Utc>,
    message_count: usize,
    streaming: bool,
    finished: bool,
}

impl fmt::Debug for TurnTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnTimer")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("streaming", &self.streaming)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl TurnTimer {
    /// Note the model being invoked
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    /// Provider id
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Time since the turn started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record a successful turn
    pub fn succeed(mut self, model: impl Into<String>, fallback_used: bool) {
        self.model = Some(model.into());
        self.finish(TurnOutcome::Success, fallback_used, None);
    }

    /// Record a failed turn
    pub fn fail(mut self, error: &GatewayError) {
        let fallback_used = matches!(
            error,
            GatewayError::GenerationFailure {
                fallback_model: Some(_),
                ..
            }
        );
        self.finish(TurnOutcome::Failure, fallback_used, Some(error));
    }

    fn finish(&mut self, outcome: TurnOutcome, fallback_used: bool, error: Option<&GatewayError>) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.logger.record(TurnRecord {
            provider: std::mem::take(&mut self.provider),
            model: self.model.take(),
            started_at: self.started_at,
            duration: self.started.elapsed(),
            message_count: self.message_count,
            streaming: self.streaming,
            fallback_used,
            outcome,
            error_code: error.map(GatewayError::error_code),
            error: error.map(ToString::to_string),
        });
    }
}

impl Drop for TurnTimer {
    fn drop(&mut self) {
        self.finish(TurnOutcome::Cancelled, false, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_succeed_records_once() {
        let (logger, mut rx) = RequestLogger::channel(8);

        let timer = logger.start_turn("gpt", 3, false);
        timer.succeed("gpt-4o", true);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.provider, "gpt");
        assert_eq!(record.model.as_deref(), Some("gpt-4o"));
        assert_eq!(record.outcome, TurnOutcome::Success);
        assert_eq!(record.message_count, 3);
        assert!(record.fallback_used);
        assert!(record.error_code.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fail_records_error_code() {
        let (logger, mut rx) = RequestLogger::channel(8);

        let mut timer = logger.start_turn("claude", 1, true);
        timer.set_model("c1");
        timer.fail(&GatewayError::GenerationFailure {
            provider: "claude".to_string(),
            primary_model: "c1".to_string(),
            primary_error: "boom".to_string(),
            fallback_model: Some("c2".to_string()),
            fallback_error: Some("bust".to_string()),
        });

        let record = rx.recv().await.unwrap();
        assert_eq!(record.outcome, TurnOutcome::Failure);
        assert_eq!(record.error_code, Some("GENERATION_FAILED"));
        assert!(record.fallback_used);
        assert!(record.streaming);
        assert_eq!(record.model.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_drop_records_cancelled() {
        let (logger, mut rx) = RequestLogger::channel(8);

        {
            let mut timer = logger.start_turn("gemini", 2, true);
            timer.set_model("g1");
        }

        let record = rx.recv().await.unwrap();
        assert_eq!(record.outcome, TurnOutcome::Cancelled);
        assert_eq!(record.model.as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn test_full_channel_never_blocks() {
        let (logger, _rx) = RequestLogger::channel(1);

        logger.start_turn("gpt", 1, false).succeed("m", false);
        logger.start_turn("gpt", 1, false).succeed("m", false);

        assert_eq!(logger.dropped(), 1);
    }

    #[tokio::test]
    async fn test_sink_updates_metrics() {
        let metrics = Metrics::new(&crate::metrics::MetricsConfig::default()).unwrap();
        let (logger, rx) = RequestLogger::channel(8);
        let sink = tokio::spawn(run_sink(rx, Some(metrics.clone())));

        logger.start_turn("gpt", 1, false).succeed("gpt-4o", false);
        drop(logger);
        sink.await.unwrap();

        assert!(metrics
            .gather()
            .unwrap()
            .contains("gateway_chat_requests_total{outcome=\"success\",provider=\"gpt\"} 1"));
    }

    #[test]
    fn test_record_serializes_duration_in_millis() {
        let record = TurnRecord {
            provider: "gpt".to_string(),
            model: None,
            started_at: Utc::now(),
            duration: Duration::from_millis(1500),
            message_count: 1,
            streaming: false,
            fallback_used: false,
            outcome: TurnOutcome::Cancelled,
            error_code: None,
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["outcome"], "cancelled");
    }
}
