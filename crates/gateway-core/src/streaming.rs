//! Fragment streams and stream framing.
//!
//! Upstream providers deliver text in different ways; the dispatcher turns
//! every one of them into a [`FragmentStream`], and [`frame`] turns that into
//! the uniform frame sequence the server writes to the wire.

use crate::error::GatewayError;
use futures::stream::{BoxStream, FusedStream, Stream, StreamExt};
use serde_json::json;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tracing::debug;

/// Lazy, finite, non-restartable sequence of text fragments.
///
/// The sequence ends after the upstream finishes or after the first error.
/// Dropping it, or calling [`FragmentStream::close`], drops the upstream
/// stream and with it any in-flight request.
pub struct FragmentStream {
    inner: Option<BoxStream<'static, Result<String, GatewayError>>>,
    completed: bool,
}

impl FragmentStream {
    /// Wrap an upstream fragment stream
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String, GatewayError>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(stream)),
            completed: false,
        }
    }

    /// Stop consuming and cancel the upstream call
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            if !self.completed {
                debug!("Fragment stream closed before completion, cancelling upstream");
            }
            drop(inner);
        }
    }

    /// Whether the upstream ran to its end (successfully or with an error)
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.completed = true;
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(error))) => {
                this.completed = true;
                this.inner = None;
                Poll::Ready(Some(Err(error)))
            }
            other => other,
        }
    }
}

impl FusedStream for FragmentStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream")
            .field("open", &self.inner.is_some())
            .field("completed", &self.completed)
            .finish()
    }
}

/// Split a whole response into word fragments (`word + " "`).
///
/// Used for providers whose delivery is chunked. The stream yields to the
/// scheduler between fragments.
pub fn chunk_words(text: &str) -> BoxStream<'static, Result<String, GatewayError>> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| format!("{word} "))
        .collect();

    Box::pin(async_stream::stream! {
        for word in words {
            yield Ok(word);
            tokio::task::yield_now().await;
        }
    })
}

/// One wire-level stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A fragment of generated text
    Delta {
        /// Turn identifier
        id: String,
        /// Fragment text
        content: String,
    },
    /// The generation failed; terminal
    Error {
        /// Human readable message
        message: String,
    },
    /// Normal end of stream; terminal
    Done,
}

impl StreamFrame {
    /// Whether no frame follows this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }

    /// Serialized `data:` payload of the frame
    #[must_use]
    pub fn payload(&self) -> String {
        match self {
            Self::Delta { id, content } => json!({
                "id": id,
                "delta": { "content": content },
            })
            .to_string(),
            Self::Error { message } => json!({ "error": message }).to_string(),
            Self::Done => "[DONE]".to_string(),
        }
    }
}

/// Frame a fragment stream.
///
/// Every fragment becomes one [`StreamFrame::Delta`] as soon as it arrives.
/// The sequence ends with exactly one [`StreamFrame::Done`] or exactly one
/// [`StreamFrame::Error`].
pub fn frame(turn_id: String, fragments: FragmentStream) -> BoxStream<'static, StreamFrame> {
    Box::pin(async_stream::stream! {
        let mut fragments = fragments;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(content) => yield StreamFrame::Delta { id: turn_id.clone(), content },
                Err(error) => {
                    yield StreamFrame::Error { message: error.to_string() };
                    return;
                }
            }
        }
        yield StreamFrame::Done;
    })
}

/// Process-wide monotonic turn identifiers
#[derive(Debug)]
pub struct TurnIdGenerator {
    next: AtomicU64,
}

impl TurnIdGenerator {
    /// Create a generator starting at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Next identifier for a turn on `provider`
    pub fn next_id(&self, provider: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{provider}-{n}")
    }
}

impl Default for TurnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn fragments(items: Vec<Result<String, GatewayError>>) -> FragmentStream {
        FragmentStream::new(stream::iter(items))
    }

    #[tokio::test]
    async fn test_frames_fragments_then_done() {
        let frames: Vec<StreamFrame> = frame(
            "alpha-1".to_string(),
            fragments(vec![Ok("Hel".to_string()), Ok("lo".to_string())]),
        )
        .collect()
        .await;

        assert_eq!(
            frames,
            vec![
                StreamFrame::Delta {
                    id: "alpha-1".to_string(),
                    content: "Hel".to_string()
                },
                StreamFrame::Delta {
                    id: "alpha-1".to_string(),
                    content: "lo".to_string()
                },
                StreamFrame::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_terminates_without_done() {
        let frames: Vec<StreamFrame> = frame(
            "alpha-2".to_string(),
            fragments(vec![
                Ok("partial".to_string()),
                Err(GatewayError::provider("alpha", "connection reset", None, true)),
                Ok("never".to_string()),
            ]),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], StreamFrame::Delta { .. }));
        match &frames[1] {
            StreamFrame::Error { message } => assert!(message.contains("connection reset")),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_stream_yields_only_done() {
        let frames: Vec<StreamFrame> = frame("x-1".to_string(), fragments(vec![]))
            .collect()
            .await;
        assert_eq!(frames, vec![StreamFrame::Done]);
    }

    #[test]
    fn test_frame_payloads() {
        let delta = StreamFrame::Delta {
            id: "gpt-7".to_string(),
            content: "hi".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&delta.payload()).unwrap();
        assert_eq!(value["id"], "gpt-7");
        assert_eq!(value["delta"]["content"], "hi");

        let error = StreamFrame::Error {
            message: "boom".to_string(),
        };
        assert_eq!(error.payload(), r#"{"error":"boom"}"#);
        assert_eq!(StreamFrame::Done.payload(), "[DONE]");
    }

    #[tokio::test]
    async fn test_fragment_stream_is_not_restartable() {
        let mut stream = fragments(vec![Ok("a".to_string())]);
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.is_none());
        assert!(stream.is_completed());
        assert!(stream.is_terminated());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_drops_upstream() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let upstream = stream::pending::<Result<String, GatewayError>>().map(move |item| {
            let _keep = &flag;
            item
        });

        let mut stream = FragmentStream::new(upstream);
        stream.close();
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!stream.is_completed());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_chunk_words() {
        let words: Vec<String> = chunk_words("Hello  brave\nnew world")
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(words, vec!["Hello ", "brave ", "new ", "world "]);
    }

    #[test]
    fn test_turn_ids_are_monotonic() {
        let ids = TurnIdGenerator::new();
        assert_eq!(ids.next_id("gpt"), "gpt-1");
        assert_eq!(ids.next_id("claude"), "claude-2");
        assert_eq!(ids.next_id("gpt"), "gpt-3");
    }
}
