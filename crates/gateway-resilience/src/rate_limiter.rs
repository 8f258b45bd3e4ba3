//! Sliding-window request counting.
//!
//! Each scope key owns a queue of admission instants. Stale instants are
//! purged on every access to that key, before any decision is taken; keys
//! that stop receiving traffic keep their last queue until
//! [`SlidingWindowLimiter::sweep_idle`] runs.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type Window = Arc<Mutex<VecDeque<Instant>>>;

/// Point-in-time view of one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStatus {
    /// Admissions currently inside the window
    pub count: u32,
    /// Seconds until the oldest admission leaves the window (rounded up)
    pub reset_seconds: u64,
}

/// Per-key sliding-window counter
///
/// The purge-then-append sequence runs under the key's own mutex, so
/// concurrent admissions on one key never overshoot the budget and
/// admissions on different keys never contend.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, Window>,
}

impl SlidingWindowLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self, key: &str) -> Window {
        if let Some(window) = self.windows.get(key) {
            return Arc::clone(&window);
        }
        Arc::clone(&self.windows.entry(key.to_string()).or_default())
    }

    /// Admit one request for `key` if fewer than `max_requests` were
    /// admitted within the trailing `window`.
    pub fn admit(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        let slot = self.window(key);
        let mut timestamps = slot.lock();
        let now = Instant::now();
        purge(&mut timestamps, now, window);

        if timestamps.len() >= max_requests as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Count and reset time of `key` after purging
    pub fn status(&self, key: &str, window: Duration) -> WindowStatus {
        let Some(slot) = self.windows.get(key).map(|w| Arc::clone(&w)) else {
            return WindowStatus {
                count: 0,
                reset_seconds: 0,
            };
        };

        let mut timestamps = slot.lock();
        let now = Instant::now();
        purge(&mut timestamps, now, window);

        let reset_seconds = timestamps.front().map_or(0, |oldest| {
            let left = window.saturating_sub(now.duration_since(*oldest));
            left.as_secs() + u64::from(left.subsec_nanos() > 0)
        });

        WindowStatus {
            count: u32::try_from(timestamps.len()).unwrap_or(u32::MAX),
            reset_seconds,
        }
    }

    /// `max_requests` minus the admissions inside the window, never negative
    pub fn remaining(&self, key: &str, max_requests: u32, window: Duration) -> u32 {
        max_requests.saturating_sub(self.status(key, window).count)
    }

    /// Seconds until the oldest admission leaves the window, 0 when empty
    pub fn reset_seconds(&self, key: &str, window: Duration) -> u64 {
        self.status(key, window).reset_seconds
    }

    /// Drop keys whose windows are empty. Returns how many were removed.
    pub fn sweep_idle(&self, window: Duration) -> usize {
        let before = self.windows.len();
        let now = Instant::now();
        self.windows.retain(|_, slot| {
            // a caller holding a clone may be about to record an admission
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let mut timestamps = slot.lock();
            purge(&mut timestamps, now, window);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no key is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

fn purge(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) < window {
            break;
        }
        timestamps.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_admit_until_budget_then_reject() {
        let limiter = SlidingWindowLimiter::new();
        assert!(limiter.admit("global", 1, WINDOW));
        assert!(!limiter.admit("global", 1, WINDOW));

        tokio::time::advance(WINDOW).await;
        assert!(limiter.admit("global", 1, WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_recorded() {
        let limiter = SlidingWindowLimiter::new();
        assert!(limiter.admit("k", 2, WINDOW));
        assert!(limiter.admit("k", 2, WINDOW));
        for _ in 0..5 {
            assert!(!limiter.admit("k", 2, WINDOW));
        }
        assert_eq!(limiter.status("k", WINDOW).count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new();
        assert!(limiter.admit("k", 2, WINDOW));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("k", 2, WINDOW));
        assert!(!limiter.admit("k", 2, WINDOW));

        // the first admission leaves the window, the second stays
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.remaining("k", 2, WINDOW), 1);
        assert!(limiter.admit("k", 2, WINDOW));
        assert!(!limiter.admit("k", 2, WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_plus_count_is_budget() {
        let limiter = SlidingWindowLimiter::new();
        for admitted in 0..5u32 {
            let status = limiter.status("k", WINDOW);
            assert_eq!(status.count, admitted);
            assert_eq!(limiter.remaining("k", 5, WINDOW) + status.count, 5);
            assert!(limiter.admit("k", 5, WINDOW));
        }
        assert_eq!(limiter.remaining("k", 5, WINDOW), 0);
        assert_eq!(limiter.remaining("k", 3, WINDOW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_seconds_rounds_up() {
        let limiter = SlidingWindowLimiter::new();
        assert_eq!(limiter.reset_seconds("k", WINDOW), 0);

        limiter.admit("k", 10, WINDOW);
        assert_eq!(limiter.reset_seconds("k", WINDOW), 60);

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(limiter.reset_seconds("k", WINDOW), 50);

        tokio::time::advance(Duration::from_millis(49_500)).await;
        assert_eq!(limiter.reset_seconds("k", WINDOW), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new();
        assert!(limiter.admit("gpt", 1, WINDOW));
        assert!(limiter.admit("claude", 1, WINDOW));
        assert!(!limiter.admit("gpt", 1, WINDOW));
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_idle_drops_only_empty_windows() {
        let limiter = SlidingWindowLimiter::new();
        limiter.admit("old", 10, WINDOW);
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.admit("fresh", 10, WINDOW);
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(limiter.sweep_idle(WINDOW), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.status("fresh", WINDOW).count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_overshoot() {
        let limiter = Arc::new(SlidingWindowLimiter::new());
        let admitted = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                tokio::spawn(async move {
                    for _ in 0..4 {
                        if limiter.admit("shared", 10, WINDOW) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
        assert_eq!(limiter.status("shared", WINDOW).count, 10);
    }
}
