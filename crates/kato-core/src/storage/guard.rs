//! Storage resilience guard
//!
//! Wraps a tier with per-call deadlines, bounded retries with exponential
//! backoff, and a circuit breaker that fails fast after repeated failures
//! and probes again once a cool-down elapses. Only transport-class failures
//! (`StorageUnavailable`, `Timeout`) count against the breaker; semantic
//! errors pass through untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{KatoError, Result};
use crate::observation::Event;
use crate::stats::EngineStats;

use super::{CounterStore, IndexRow, KbId, PatternIndex, PatternStore};

/// Retry / breaker policy for one tier
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    /// Attempts beyond the first
    pub max_retries: u32,
    /// First backoff; doubles per retry
    pub base_backoff: Duration,
    /// Consecutive failures that open the breaker
    pub breaker_threshold: u32,
    /// How long the breaker stays open before a half-open probe
    pub breaker_cooldown: Duration,
    /// Deadline for a single storage call
    pub op_timeout: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(50),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(10),
            op_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-tier breaker + retry state
pub struct Guard {
    tier: &'static str,
    policy: GuardPolicy,
    state: Mutex<BreakerState>,
    stats: Option<Arc<EngineStats>>,
}

impl Guard {
    pub fn new(tier: &'static str, policy: GuardPolicy) -> Self {
        Self {
            tier,
            policy,
            state: Mutex::new(BreakerState::default()),
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    fn check_breaker(&self) -> Result<()> {
        let state = self.state.lock();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() < self.policy.breaker_cooldown {
                return Err(KatoError::CircuitBreakerOpen { tier: self.tier });
            }
            // Cooled down: let this call through as the half-open probe.
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        if state.opened_at.is_some() {
            tracing::info!(tier = self.tier, "Circuit breaker closed after probe");
        }
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.policy.breaker_threshold {
            if state.opened_at.is_none() {
                tracing::warn!(
                    tier = self.tier,
                    failures = state.consecutive_failures,
                    "Circuit breaker opened"
                );
                if let Some(stats) = &self.stats {
                    stats.breaker_opened();
                }
            }
            state.opened_at = Some(Instant::now());
        }
    }

    fn retryable(error: &KatoError) -> bool {
        matches!(
            error,
            KatoError::StorageUnavailable { .. } | KatoError::Timeout(_)
        )
    }

    /// Run `op` under the policy: deadline per attempt, backoff between
    /// retries, breaker accounting across calls.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.check_breaker()?;

        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.op_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(KatoError::Timeout(self.policy.op_timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Err(error) if Self::retryable(&error) => {
                    self.record_failure();
                    if attempt >= self.policy.max_retries {
                        return Err(error);
                    }
                    let backoff = self.policy.base_backoff * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        tier = self.tier,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "Retrying storage call"
                    );
                    if let Some(stats) = &self.stats {
                        stats.storage_retried();
                    }
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

// ============================================================================
// GUARDED TIER WRAPPERS
// ============================================================================

/// Document tier behind a guard
pub struct GuardedStore<S> {
    inner: Arc<S>,
    guard: Guard,
}

impl<S> GuardedStore<S> {
    pub fn new(inner: Arc<S>, guard: Guard) -> Self {
        Self { inner, guard }
    }
}

#[async_trait]
impl<S: PatternStore + 'static> PatternStore for GuardedStore<S> {
    async fn put_if_absent(&self, kb: &KbId, name: &str, events: &[Event]) -> Result<bool> {
        self.guard
            .run(|| self.inner.put_if_absent(kb, name, events))
            .await
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<Vec<Event>>> {
        self.guard.run(|| self.inner.get(kb, name)).await
    }

    async fn exists(&self, kb: &KbId, name: &str) -> Result<bool> {
        self.guard.run(|| self.inner.exists(kb, name)).await
    }

    async fn scan_names(&self, kb: &KbId) -> Result<Vec<String>> {
        self.guard.run(|| self.inner.scan_names(kb)).await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        self.guard.run(|| self.inner.clear_kb(kb)).await
    }
}

/// Columnar tier behind a guard
pub struct GuardedIndex<S> {
    inner: Arc<S>,
    guard: Guard,
}

impl<S> GuardedIndex<S> {
    pub fn new(inner: Arc<S>, guard: Guard) -> Self {
        Self { inner, guard }
    }
}

#[async_trait]
impl<S: PatternIndex + 'static> PatternIndex for GuardedIndex<S> {
    async fn put_if_absent(&self, kb: &KbId, row: &IndexRow) -> Result<bool> {
        self.guard.run(|| self.inner.put_if_absent(kb, row)).await
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<IndexRow>> {
        self.guard.run(|| self.inner.get(kb, name)).await
    }

    async fn all_rows(&self, kb: &KbId) -> Result<Vec<IndexRow>> {
        self.guard.run(|| self.inner.all_rows(kb)).await
    }

    async fn rows_for_bands(&self, kb: &KbId, bands: &[u64]) -> Result<Vec<IndexRow>> {
        self.guard.run(|| self.inner.rows_for_bands(kb, bands)).await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        self.guard.run(|| self.inner.clear_kb(kb)).await
    }
}

/// Key-value tier behind a guard
pub struct GuardedCounters<S> {
    inner: Arc<S>,
    guard: Guard,
}

impl<S> GuardedCounters<S> {
    pub fn new(inner: Arc<S>, guard: Guard) -> Self {
        Self { inner, guard }
    }
}

#[async_trait]
impl<S: CounterStore + 'static> CounterStore for GuardedCounters<S> {
    async fn incr(&self, kb: &KbId, key: &str, by: i64) -> Result<i64> {
        self.guard.run(|| self.inner.incr(kb, key, by)).await
    }

    async fn get_int(&self, kb: &KbId, key: &str) -> Result<Option<i64>> {
        self.guard.run(|| self.inner.get_int(kb, key)).await
    }

    async fn get_json(&self, kb: &KbId, key: &str) -> Result<Option<serde_json::Value>> {
        self.guard.run(|| self.inner.get_json(kb, key)).await
    }

    async fn put_json(&self, kb: &KbId, key: &str, value: &serde_json::Value) -> Result<()> {
        self.guard.run(|| self.inner.put_json(kb, key, value)).await
    }

    async fn delete(&self, kb: &KbId, key: &str) -> Result<bool> {
        self.guard.run(|| self.inner.delete(kb, key)).await
    }

    async fn count_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        self.guard.run(|| self.inner.count_prefix(kb, prefix)).await
    }

    async fn delete_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        self.guard.run(|| self.inner.delete_prefix(kb, prefix)).await
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        self.guard.run(|| self.inner.clear_kb(kb)).await
    }
}
