//! Session management
//!
//! Owns the process-wide session table and orchestrates the observe / learn /
//! predict paths with each session's effective configuration. Sessions are
//! volatile: STM, pending emotives, and config overrides live here and die
//! with the process; patterns, counters, and indices persist in the tiers.
//!
//! Concurrency: per-session state sits behind a `tokio::Mutex`, so operations
//! on one session are serialized in arrival order while different sessions
//! proceed in parallel. Predict snapshots the STM under the lock and releases
//! it before any storage I/O; learn holds it so a failed write leaves the STM
//! untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ConfigUpdate, GenesConfig};
use crate::emotives::{EmotiveRecord, EmotiveWindow, MetadataSets};
use crate::error::{KatoError, Result};
use crate::learn::PatternWriter;
use crate::observation::{Observation, canonicalize};
use crate::pattern::PatternRecord;
use crate::predict::{Prediction, PredictionAssembler};
use crate::stats::EngineStats;
use crate::stm::ShortTermMemory;
use crate::storage::{KbId, Tiers, keys};

/// Limits and timing for the session table
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Ceiling on concurrently open sessions
    pub max_sessions: usize,
    /// TTL applied when the client does not supply one
    pub default_ttl: Duration,
    /// Background sweep cadence
    pub sweep_interval: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SessionLimits {
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Ok(raw) = std::env::var("KATO_MAX_SESSIONS") {
            if let Ok(v) = raw.parse() {
                limits.max_sessions = v;
            }
        }
        if let Ok(raw) = std::env::var("KATO_SESSION_TTL_SECONDS") {
            if let Ok(v) = raw.parse() {
                limits.default_ttl = Duration::from_secs(v);
            }
        }
        limits
    }
}

/// Mutable per-session state, serialized behind the session's lock
#[derive(Debug, Default)]
struct SessionState {
    stm: ShortTermMemory,
    /// Vector dimensionality pinned by the session's first vector
    vector_dim: Option<usize>,
    pending_emotives: Vec<EmotiveRecord>,
    pending_metadata: MetadataSets,
    overrides: ConfigUpdate,
}

/// One client session
pub struct Session {
    pub session_id: String,
    pub node_id: String,
    pub kb_id: KbId,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    ttl: Duration,
    /// Idle deadline base: epoch seconds of the last touch
    last_access: AtomicI64,
    state: tokio::sync::Mutex<SessionState>,
}

impl Session {
    fn touch(&self) {
        self.last_access
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    fn expired(&self) -> bool {
        let last = self.last_access.load(Ordering::Relaxed);
        Utc::now().timestamp() - last > self.ttl.as_secs() as i64
    }

    fn time_remaining_seconds(&self) -> i64 {
        let last = self.last_access.load(Ordering::Relaxed);
        (last + self.ttl.as_secs() as i64 - Utc::now().timestamp()).max(0)
    }
}

/// Point-in-time session description
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub stm_length: usize,
    pub time_remaining_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Acknowledgement for one observation
#[derive(Debug, Clone, Serialize)]
pub struct ObserveAck {
    pub status: &'static str,
    pub stm_length: usize,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_learned_pattern: Option<String>,
}

/// Result of one bulk observe-sequence call
#[derive(Debug, Clone, Serialize)]
pub struct SequenceOutcome {
    pub status: &'static str,
    pub observations_processed: usize,
    pub results: Vec<ObserveAck>,
    pub auto_learned_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_learned_pattern: Option<String>,
}

/// Process-wide session manager
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    defaults: GenesConfig,
    limits: SessionLimits,
    tiers: Tiers,
    writer: PatternWriter,
    assembler: PredictionAssembler,
    stats: Arc<EngineStats>,
}

impl SessionManager {
    pub fn new(
        tiers: Tiers,
        defaults: GenesConfig,
        limits: SessionLimits,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            writer: PatternWriter::new(tiers.clone()),
            assembler: PredictionAssembler::new(tiers.clone(), stats.clone()),
            tiers,
            defaults,
            limits,
            stats,
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a session bound to `node_id`'s knowledge base
    pub fn create_session(
        &self,
        node_id: &str,
        ttl_seconds: Option<u64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<SessionInfo> {
        if node_id.is_empty() {
            return Err(KatoError::Validation("node_id must be non-empty".into()));
        }
        self.purge_expired();
        if self.sessions.len() >= self.limits.max_sessions {
            return Err(KatoError::SessionLimitExceeded {
                limit: self.limits.max_sessions,
            });
        }

        let now = Utc::now();
        let session = Arc::new(Session {
            session_id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            kb_id: KbId::from_node_id(node_id),
            created_at: now,
            metadata,
            ttl: ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(self.limits.default_ttl),
            last_access: AtomicI64::new(now.timestamp()),
            state: tokio::sync::Mutex::new(SessionState::default()),
        });
        let info = self.describe(&session, 0);
        self.sessions
            .insert(session.session_id.clone(), session);
        self.stats.session_created();
        Ok(info)
    }

    fn describe(&self, session: &Session, stm_length: usize) -> SessionInfo {
        let remaining = session.time_remaining_seconds();
        SessionInfo {
            session_id: session.session_id.clone(),
            node_id: session.node_id.clone(),
            created_at: session.created_at,
            expires_at: Utc::now() + chrono::Duration::seconds(remaining),
            stm_length,
            time_remaining_seconds: remaining,
            metadata: session.metadata.clone(),
        }
    }

    /// Look up a live session, applying lazy TTL eviction
    fn get(&self, session_id: &str) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KatoError::SessionNotFound(session_id.to_string()))?;
        if session.expired() {
            self.sessions.remove(session_id);
            self.stats.session_expired();
            return Err(KatoError::SessionExpired(session_id.to_string()));
        }
        session.touch();
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.get(session_id)?;
        let stm_length = session.state.lock().await.stm.len();
        Ok(self.describe(&session, stm_length))
    }

    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| KatoError::SessionNotFound(session_id.to_string()))
    }

    /// Drop every expired session. Called lazily and from the sweeper.
    pub fn purge_expired(&self) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expired())
            .map(|entry| entry.key().clone())
            .collect();
        for session_id in expired {
            if self.sessions.remove(&session_id).is_some() {
                self.stats.session_expired();
                tracing::debug!(%session_id, "Evicted expired session");
            }
        }
    }

    /// Background TTL sweep; run as a spawned task
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.limits.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.purge_expired();
        }
    }

    // ========================================================================
    // CONFIG
    // ========================================================================

    /// Effective configuration: system defaults overlaid with the session's
    /// overrides
    pub async fn effective_config(&self, session_id: &str) -> Result<GenesConfig> {
        let session = self.get(session_id)?;
        let state = session.state.lock().await;
        self.defaults.merged(&state.overrides)
    }

    /// Apply a config update to the session. Invalid updates leave the
    /// session untouched.
    pub async fn update_config(&self, session_id: &str, update: &ConfigUpdate) -> Result<()> {
        let session = self.get(session_id)?;
        let mut state = session.state.lock().await;
        let mut merged_overrides = state.overrides.clone();
        merged_overrides.overlay(update);
        // Validate the whole effective record before committing.
        self.defaults.merged(&merged_overrides)?;
        state.overrides = merged_overrides;
        Ok(())
    }

    // ========================================================================
    // OBSERVE / LEARN / PREDICT
    // ========================================================================

    /// Process one observation: canonicalize, append to STM, auto-learn when
    /// the bound is reached.
    pub async fn observe(&self, session_id: &str, observation: &Observation) -> Result<ObserveAck> {
        let session = self.get(session_id)?;
        let unique_id = observation
            .unique_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = session.state.lock().await;
        let config = self.defaults.merged(&state.overrides)?;
        observation.validate(state.vector_dim)?;
        if state.vector_dim.is_none() {
            if let Some(first) = observation.vectors.first() {
                state.vector_dim = Some(first.len());
            }
        }

        if observation.is_empty() {
            return Ok(ObserveAck {
                status: "okay",
                stm_length: state.stm.len(),
                unique_id,
                auto_learned_pattern: None,
            });
        }

        let event = canonicalize(observation, config.sort_symbols);
        state.stm.push(event);
        if !observation.emotives.is_empty() {
            state.pending_emotives.push(observation.emotives.clone());
        }
        if !observation.metadata.is_empty() {
            state.pending_metadata.union_observation(&observation.metadata);
        }
        self.stats.observation_processed();

        let mut auto_learned = None;
        if config.max_pattern_length > 0 && state.stm.len() >= config.max_pattern_length {
            let name = self.learn_locked(&session.kb_id, &mut state, &config).await?;
            auto_learned = name;
        }

        Ok(ObserveAck {
            status: "okay",
            stm_length: state.stm.len(),
            unique_id,
            auto_learned_pattern: auto_learned,
        })
    }

    /// Process an ordered batch of observations
    pub async fn observe_sequence(
        &self,
        session_id: &str,
        observations: &[Observation],
        learn_after_each: bool,
        learn_at_end: bool,
        clear_stm_between: bool,
    ) -> Result<SequenceOutcome> {
        let mut results = Vec::with_capacity(observations.len());
        let mut auto_learned_patterns = Vec::new();

        for observation in observations {
            if clear_stm_between {
                self.clear_stm(session_id).await?;
            }
            let ack = self.observe(session_id, observation).await?;
            if let Some(name) = &ack.auto_learned_pattern {
                auto_learned_patterns.push(name.clone());
            }
            if learn_after_each {
                if let Some(name) = self.learn(session_id).await? {
                    auto_learned_patterns.push(name);
                }
            }
            results.push(ack);
        }

        let final_learned_pattern = if learn_at_end {
            self.learn(session_id).await?
        } else {
            None
        };

        Ok(SequenceOutcome {
            status: "completed",
            observations_processed: results.len(),
            results,
            auto_learned_patterns,
            final_learned_pattern,
        })
    }

    /// Learn the session's current STM into its KB. Returns `None` when the
    /// STM is empty.
    pub async fn learn(&self, session_id: &str) -> Result<Option<String>> {
        let session = self.get(session_id)?;
        let mut state = session.state.lock().await;
        let config = self.defaults.merged(&state.overrides)?;
        self.learn_locked(&session.kb_id, &mut state, &config).await
    }

    /// Learn from state already under the session lock.
    ///
    /// The STM is truncated only after all tiers acknowledged; a storage
    /// failure propagates with the STM intact.
    async fn learn_locked(
        &self,
        kb: &KbId,
        state: &mut SessionState,
        config: &GenesConfig,
    ) -> Result<Option<String>> {
        if state.stm.is_empty() {
            return Ok(None);
        }
        let snapshot = state.stm.snapshot();
        let outcome = self
            .writer
            .learn(
                kb,
                &snapshot,
                &state.pending_emotives,
                &state.pending_metadata,
                config,
            )
            .await?;

        state
            .stm
            .truncate_after_learn(config.stm_mode, config.max_pattern_length);
        state.pending_emotives.clear();
        state.pending_metadata = MetadataSets::new();
        self.assembler.invalidate(kb);
        self.stats.pattern_learned();
        Ok(Some(outcome.name))
    }

    /// Current STM contents
    pub async fn get_stm(&self, session_id: &str) -> Result<Vec<Vec<String>>> {
        let session = self.get(session_id)?;
        let state = session.state.lock().await;
        Ok(state.stm.snapshot())
    }

    /// Empty the STM and the pending emotive/metadata accumulators
    pub async fn clear_stm(&self, session_id: &str) -> Result<()> {
        let session = self.get(session_id)?;
        let mut state = session.state.lock().await;
        state.stm.clear();
        state.pending_emotives.clear();
        state.pending_metadata = MetadataSets::new();
        Ok(())
    }

    /// Clear the STM and the whole knowledge base behind the session
    pub async fn clear_all_memory(&self, session_id: &str) -> Result<u64> {
        let session = self.get(session_id)?;
        self.clear_stm(session_id).await?;
        let removed = self.tiers.clear_kb(&session.kb_id).await?;
        self.assembler.invalidate(&session.kb_id);
        Ok(removed)
    }

    /// Predictions for the session's current STM.
    ///
    /// The STM is snapshotted under the session lock and released before any
    /// storage work, so long predicts do not block the session's reads.
    pub async fn get_predictions(&self, session_id: &str) -> Result<Vec<Prediction>> {
        let session = self.get(session_id)?;
        let (snapshot, config) = {
            let state = session.state.lock().await;
            (state.stm.snapshot(), self.defaults.merged(&state.overrides)?)
        };
        self.assembler
            .predictions_for(&session.kb_id, &snapshot, &config)
            .await
    }

    // ========================================================================
    // PATTERN RETRIEVAL
    // ========================================================================

    /// Full pattern record (body joined with counter state) for a KB
    pub async fn pattern_record(&self, kb: &KbId, name: &str) -> Result<Option<PatternRecord>> {
        let Some(events) = self.tiers.store.get(kb, name).await? else {
            return Ok(None);
        };
        let frequency = self
            .tiers
            .counters
            .get_int(kb, &keys::frequency(name))
            .await?
            .unwrap_or(1);
        let emotives = match self.tiers.counters.get_json(kb, &keys::emotives(name)).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => EmotiveWindow::new(),
        };
        let metadata = match self.tiers.counters.get_json(kb, &keys::metadata(name)).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => MetadataSets::new(),
        };
        let token_set: Vec<String> = {
            let set: std::collections::BTreeSet<String> =
                events.iter().flatten().cloned().collect();
            set.into_iter().collect()
        };
        Ok(Some(PatternRecord {
            name: name.to_string(),
            length: events.iter().map(|e| e.len()).sum(),
            token_set,
            pattern_data: events,
            frequency,
            emotives,
            metadata,
        }))
    }

    /// Pattern record resolved through a session's KB
    pub async fn pattern_record_for_session(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<Option<PatternRecord>> {
        let session = self.get(session_id)?;
        self.pattern_record(&session.kb_id, name).await
    }

    /// Rebuild missing index rows for a session's KB
    pub async fn repair_index(&self, session_id: &str) -> Result<u64> {
        let session = self.get(session_id)?;
        let config = self.effective_config(session_id).await?;
        self.writer.repair_index(&session.kb_id, &config).await
    }
}
