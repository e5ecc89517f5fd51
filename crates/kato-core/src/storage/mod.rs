//! Storage tiers
//!
//! Three per-tenant tiers behind async traits:
//!
//! - [`PatternStore`] — document tier, full pattern bodies
//! - [`PatternIndex`] — columnar tier, pre-computed filter indices
//! - [`CounterStore`] — key-value tier, frequencies / emotives / metadata /
//!   symbol statistics / prediction caches
//!
//! Every operation is namespaced by [`KbId`]; two sessions with the same
//! node id share all tier state, different node ids are mutually invisible.
//! Implementations: [`memory::MemoryTiers`] and [`sqlite::SqliteTiers`], both
//! wrappable by [`guard`] for retry/backoff/circuit-breaking.

pub mod guard;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::observation::Event;

// ============================================================================
// TENANT IDENTITY
// ============================================================================

/// Knowledge-base identifier: the tenant namespace for all tier state.
///
/// Derived 1:1 from the client-supplied `node_id`, sanitized to
/// `[A-Za-z0-9_-]` so it is safe as a key segment in any backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KbId(String);

impl KbId {
    pub fn from_node_id(node_id: &str) -> Self {
        let sanitized: String = node_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(sanitized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

/// One row of the columnar index tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub name: String,
    pub pattern_data: Vec<Event>,
    pub length: usize,
    pub token_set: Vec<String>,
    pub token_count: usize,
    pub minhash_sig: Vec<u64>,
    pub lsh_bands: Vec<u64>,
    pub first_token: Option<String>,
    pub last_token: Option<String>,
}

// ============================================================================
// COUNTER KEY GRAMMAR
// ============================================================================

/// Builders for the key-value tier's key suffixes. Implementations prepend
/// `{kb_id}:`, giving exactly the wire grammar of the original store.
pub mod keys {
    pub fn frequency(pattern: &str) -> String {
        format!("frequency:{pattern}")
    }

    pub fn emotives(pattern: &str) -> String {
        format!("emotives:{pattern}")
    }

    pub fn metadata(pattern: &str) -> String {
        format!("metadata:{pattern}")
    }

    pub fn symbol_frequency(symbol: &str) -> String {
        format!("symbol:freq:{symbol}")
    }

    pub fn symbol_pattern_members(symbol: &str) -> String {
        format!("symbol:pmf:{symbol}")
    }

    pub const SYMBOL_PMF_PREFIX: &str = "symbol:pmf:";

    pub const TOTAL_SYMBOLS_IN_PATTERNS: &str = "global:total_symbols_in_patterns_frequencies";
    pub const TOTAL_PATTERN_FREQUENCIES: &str = "global:total_pattern_frequencies";
    pub const TOTAL_UNIQUE_PATTERNS: &str = "global:total_unique_patterns";

    pub fn prediction(unique_id: &str) -> String {
        format!("prediction:{unique_id}")
    }
}

// ============================================================================
// TIER TRAITS
// ============================================================================

/// Document tier: full pattern bodies keyed by `(kb_id, name)`
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Insert the body if the key is vacant. Returns true when this call
    /// created the document.
    async fn put_if_absent(&self, kb: &KbId, name: &str, events: &[Event]) -> Result<bool>;

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<Vec<Event>>>;

    async fn exists(&self, kb: &KbId, name: &str) -> Result<bool>;

    /// All pattern names in the KB (used by the index repair task)
    async fn scan_names(&self, kb: &KbId) -> Result<Vec<String>>;

    /// Bulk administrative clear; returns the number of documents removed
    async fn clear_kb(&self, kb: &KbId) -> Result<u64>;
}

/// Columnar tier: pre-computed filter indices keyed by `(kb_id, name)`
#[async_trait]
pub trait PatternIndex: Send + Sync {
    /// Insert the row if the key is vacant. Returns true when this call
    /// created the row.
    async fn put_if_absent(&self, kb: &KbId, row: &IndexRow) -> Result<bool>;

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<IndexRow>>;

    /// Every row in the KB. The filter pipeline's input when no narrower
    /// lookup applies.
    async fn all_rows(&self, kb: &KbId) -> Result<Vec<IndexRow>>;

    /// Rows sharing at least one LSH band hash with `bands`, resolved via a
    /// keyed band index rather than a scan. Equivalent to filtering
    /// `all_rows` on band overlap; used when the MinHash stage runs first.
    async fn rows_for_bands(&self, kb: &KbId, bands: &[u64]) -> Result<Vec<IndexRow>>;

    async fn clear_kb(&self, kb: &KbId) -> Result<u64>;
}

/// Key-value tier: counters and small JSON values keyed by `(kb_id, key)`
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomic increment; missing keys start at zero. Returns the new value.
    async fn incr(&self, kb: &KbId, key: &str, by: i64) -> Result<i64>;

    async fn get_int(&self, kb: &KbId, key: &str) -> Result<Option<i64>>;

    async fn get_json(&self, kb: &KbId, key: &str) -> Result<Option<serde_json::Value>>;

    async fn put_json(&self, kb: &KbId, key: &str, value: &serde_json::Value) -> Result<()>;

    async fn delete(&self, kb: &KbId, key: &str) -> Result<bool>;

    /// Number of keys in the KB starting with `prefix` (distinct-symbol
    /// counts for the global entropy normalizer)
    async fn count_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64>;

    /// Remove every key in the KB starting with `prefix` (stale prediction
    /// caches after a learn). Returns the number of keys removed.
    async fn delete_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64>;

    async fn clear_kb(&self, kb: &KbId) -> Result<u64>;
}

// ============================================================================
// TIER BUNDLE
// ============================================================================

/// The three tiers, injected into the writer / pipeline / assembler as
/// one-way dependencies.
#[derive(Clone)]
pub struct Tiers {
    pub store: Arc<dyn PatternStore>,
    pub index: Arc<dyn PatternIndex>,
    pub counters: Arc<dyn CounterStore>,
}

impl Tiers {
    /// In-memory tiers (tests, ephemeral deployments)
    pub fn in_memory() -> Self {
        let shared = Arc::new(memory::MemoryTiers::new());
        Self {
            store: shared.clone(),
            index: shared.clone(),
            counters: shared,
        }
    }

    /// SQLite-backed tiers at the given path, wrapped in retry/backoff
    /// guards with the default policy
    pub fn sqlite(path: std::path::PathBuf) -> Result<Self> {
        let shared = Arc::new(sqlite::SqliteTiers::open(path)?);
        let policy = guard::GuardPolicy::default();
        Ok(Self {
            store: Arc::new(guard::GuardedStore::new(
                shared.clone(),
                guard::Guard::new("document", policy.clone()),
            )),
            index: Arc::new(guard::GuardedIndex::new(
                shared.clone(),
                guard::Guard::new("columnar", policy.clone()),
            )),
            counters: Arc::new(guard::GuardedCounters::new(
                shared,
                guard::Guard::new("kv", policy),
            )),
        })
    }

    /// Remove every entry for the KB across all three tiers.
    ///
    /// Counters go first so readers never observe counters for a pattern
    /// whose body has already vanished.
    pub async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let mut removed = self.counters.clear_kb(kb).await?;
        removed += self.index.clear_kb(kb).await?;
        removed += self.store.clear_kb(kb).await?;
        Ok(removed)
    }
}
