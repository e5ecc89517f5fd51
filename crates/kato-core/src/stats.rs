//! Engine counters
//!
//! Process-wide monotonic counters behind relaxed atomics. The transport
//! layer renders a snapshot at `/metrics`; nothing here owns a transport.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide engine counters
#[derive(Debug)]
pub struct EngineStats {
    started_at: DateTime<Utc>,
    observations: AtomicU64,
    patterns_learned: AtomicU64,
    predictions_served: AtomicU64,
    prediction_cache_hits: AtomicU64,
    sessions_created: AtomicU64,
    sessions_expired: AtomicU64,
    storage_retries: AtomicU64,
    breaker_opens: AtomicU64,
    consistency_violations: AtomicU64,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            observations: AtomicU64::new(0),
            patterns_learned: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
            prediction_cache_hits: AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            sessions_expired: AtomicU64::new(0),
            storage_retries: AtomicU64::new(0),
            breaker_opens: AtomicU64::new(0),
            consistency_violations: AtomicU64::new(0),
        }
    }
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observation_processed(&self) {
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pattern_learned(&self) {
        self.patterns_learned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn predictions_served(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prediction_cache_hit(&self) {
        self.prediction_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_expired(&self) {
        self.sessions_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn storage_retried(&self) {
        self.storage_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn breaker_opened(&self) {
        self.breaker_opens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consistency_violation(&self) {
        self.consistency_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            observations: self.observations.load(Ordering::Relaxed),
            patterns_learned: self.patterns_learned.load(Ordering::Relaxed),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            prediction_cache_hits: self.prediction_cache_hits.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            storage_retries: self.storage_retries.load(Ordering::Relaxed),
            breaker_opens: self.breaker_opens.load(Ordering::Relaxed),
            consistency_violations: self.consistency_violations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_seconds: i64,
    pub observations: u64,
    pub patterns_learned: u64,
    pub predictions_served: u64,
    pub prediction_cache_hits: u64,
    pub sessions_created: u64,
    pub sessions_expired: u64,
    pub storage_retries: u64,
    pub breaker_opens: u64,
    pub consistency_violations: u64,
}
