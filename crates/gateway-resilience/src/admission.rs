//! Two-scope admission control for chat turns.

use crate::rate_limiter::SlidingWindowLimiter;
use gateway_core::{GatewayError, GLOBAL_SCOPE};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Budgets of every scope
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Window shared by every scope
    pub window: Duration,
    /// Budget of the `global` scope
    pub global_max: u32,
    /// Budget of each listed provider scope
    pub provider_max: HashMap<String, u32>,
    /// Budget of a provider scope not listed in `provider_max`
    pub default_provider_max: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            global_max: 500,
            provider_max: HashMap::new(),
            default_provider_max: 200,
        }
    }
}

impl RateLimitPolicy {
    /// Policy with a global budget and window
    #[must_use]
    pub fn new(window: Duration, global_max: u32) -> Self {
        Self {
            window,
            global_max,
            ..Self::default()
        }
    }

    /// Set one provider's budget
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, max_requests: u32) -> Self {
        self.provider_max.insert(provider.into(), max_requests);
        self
    }

    /// Set the budget of unlisted providers
    #[must_use]
    pub fn with_default_provider_max(mut self, max_requests: u32) -> Self {
        self.default_provider_max = max_requests;
        self
    }

    /// Budget of a scope
    #[must_use]
    pub fn budget(&self, scope: &str) -> u32 {
        if scope == GLOBAL_SCOPE {
            return self.global_max;
        }
        self.provider_max
            .get(scope)
            .copied()
            .unwrap_or(self.default_provider_max)
    }
}

/// Rate-limit state of one scope, as reported in response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScopeSnapshot {
    /// Budget
    pub limit: u32,
    /// Admissions left in the current window
    pub remaining: u32,
    /// Seconds until a slot frees up
    pub reset_seconds: u64,
}

/// Admission control over the `global` scope and one scope per provider
#[derive(Debug, Default)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: SlidingWindowLimiter,
}

impl RateLimiter {
    /// Create a limiter for a policy
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: SlidingWindowLimiter::new(),
        }
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Admit one request in `scope` against its budget
    pub fn admit(&self, scope: &str) -> bool {
        self.windows
            .admit(scope, self.policy.budget(scope), self.policy.window)
    }

    /// Admit a chat turn for `provider_id`.
    ///
    /// The global scope is checked first. When the provider scope then
    /// rejects, the global admission already recorded stays spent.
    pub fn admit_turn(&self, provider_id: &str) -> Result<(), GatewayError> {
        self.check(GLOBAL_SCOPE)?;
        self.check(provider_id)
    }

    fn check(&self, scope: &str) -> Result<(), GatewayError> {
        if self.admit(scope) {
            debug!(scope = %scope, "Rate limit admitted");
            return Ok(());
        }

        let snapshot = self.snapshot(scope);
        warn!(
            scope = %scope,
            limit = snapshot.limit,
            reset_seconds = snapshot.reset_seconds,
            "Rate limit exceeded"
        );
        Err(GatewayError::RateLimitExceeded {
            scope: scope.to_string(),
            limit: snapshot.limit,
            reset_seconds: snapshot.reset_seconds,
        })
    }

    /// Current state of a scope
    pub fn snapshot(&self, scope: &str) -> ScopeSnapshot {
        let limit = self.policy.budget(scope);
        let status = self.windows.status(scope, self.policy.window);
        ScopeSnapshot {
            limit,
            remaining: limit.saturating_sub(status.count),
            reset_seconds: status.reset_seconds,
        }
    }

    /// Admissions left in a scope
    pub fn remaining(&self, scope: &str) -> u32 {
        self.snapshot(scope).remaining
    }

    /// Seconds until a scope frees a slot
    pub fn reset_seconds(&self, scope: &str) -> u64 {
        self.windows.reset_seconds(scope, self.policy.window)
    }

    /// Drop scopes with empty windows
    pub fn sweep_idle(&self) -> usize {
        self.windows.sweep_idle(self.policy.window)
    }
}

/// Shortest sweep period; `interval` rejects a zero period
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically drop idle scopes from `limiter`
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep_idle();
            if removed > 0 {
                debug!(removed, "Swept idle rate-limit scopes");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: u32, provider: u32) -> RateLimiter {
        RateLimiter::new(
            RateLimitPolicy::new(Duration::from_secs(60), global).with_provider("alpha", provider),
        )
    }

    #[test]
    fn test_budgets() {
        let policy = RateLimitPolicy::new(Duration::from_secs(60), 50)
            .with_provider("alpha", 5)
            .with_default_provider_max(7);
        assert_eq!(policy.budget(GLOBAL_SCOPE), 50);
        assert_eq!(policy.budget("alpha"), 5);
        assert_eq!(policy.budget("beta"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_budget_of_one() {
        let limiter = limiter(1, 10);
        assert!(limiter.admit_turn("alpha").is_ok());

        let err = limiter.admit_turn("alpha").unwrap_err();
        match err {
            GatewayError::RateLimitExceeded {
                scope,
                limit,
                reset_seconds,
            } => {
                assert_eq!(scope, GLOBAL_SCOPE);
                assert_eq!(limit, 1);
                assert_eq!(reset_seconds, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.admit_turn("alpha").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_rejection_keeps_global_slot_spent() {
        let limiter = limiter(10, 1);
        assert!(limiter.admit_turn("alpha").is_ok());

        let err = limiter.admit_turn("alpha").unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RateLimitExceeded { ref scope, .. } if scope == "alpha"
        ));
        assert_eq!(limiter.remaining(GLOBAL_SCOPE), 8);
        assert_eq!(limiter.remaining("alpha"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rejection_does_not_touch_provider_scope() {
        let limiter = limiter(1, 10);
        limiter.admit_turn("alpha").unwrap();
        limiter.admit_turn("alpha").unwrap_err();
        assert_eq!(limiter.remaining("alpha"), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_of_unseen_scope() {
        let limiter = limiter(5, 3);
        assert_eq!(
            limiter.snapshot("alpha"),
            ScopeSnapshot {
                limit: 3,
                remaining: 3,
                reset_seconds: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_idle_scopes() {
        let limiter = Arc::new(limiter(5, 5));
        limiter.admit_turn("alpha").unwrap();
        assert_eq!(limiter.windows.len(), 2);

        let handle = spawn_sweeper(Arc::clone(&limiter), Duration::from_secs(90));
        tokio::time::sleep(Duration::from_secs(91)).await;
        assert!(limiter.windows.is_empty());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_with_zero_period_keeps_running() {
        let limiter = Arc::new(limiter(5, 5));
        limiter.admit_turn("alpha").unwrap();

        let handle = spawn_sweeper(Arc::clone(&limiter), Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!handle.is_finished());
        assert!(limiter.windows.is_empty());
        handle.abort();
    }
}
