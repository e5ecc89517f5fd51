//! Pattern writer
//!
//! Turns an STM snapshot into a named pattern across all three tiers. The
//! write is idempotent per canonical sequence: re-learning the same sequence
//! leaves the body and index untouched and only moves counters, the rolling
//! emotive window, and the merged metadata.
//!
//! Tier ordering is the crash-recovery contract: body first, then index,
//! then counters. A crash mid-write can leave a body without an index row
//! (rebuilt lazily or by [`PatternWriter::repair_index`]) or a pattern
//! without counters (readers treat frequency as 1), but never an index row
//! without a body.

use crate::config::GenesConfig;
use crate::emotives::{EmotiveRecord, EmotiveWindow, MetadataSets};
use crate::error::{KatoError, Result};
use crate::observation::Event;
use crate::pattern::indexing::{MinHasher, SequenceFeatures};
use crate::pattern::pattern_name;
use crate::storage::{IndexRow, KbId, Tiers, keys};

/// Multi-tier pattern writer
#[derive(Clone)]
pub struct PatternWriter {
    tiers: Tiers,
}

/// Outcome of one learn call
#[derive(Debug, Clone)]
pub struct LearnOutcome {
    pub name: String,
    /// Frequency after this learn event
    pub frequency: i64,
    /// True when this call created the pattern
    pub first_learn: bool,
}

/// Build the columnar row for an event sequence
pub fn index_row_for(events: &[Event], config: &GenesConfig) -> IndexRow {
    let hasher = MinHasher::new(config.minhash_num_hashes);
    let features = SequenceFeatures::derive(
        events,
        &hasher,
        config.minhash_bands,
        config.minhash_rows,
    );
    IndexRow {
        name: pattern_name(events),
        pattern_data: events.to_vec(),
        length: features.length,
        token_set: features.token_set,
        token_count: features.token_count,
        minhash_sig: features.minhash_sig,
        lsh_bands: features.lsh_bands,
        first_token: features.first_token,
        last_token: features.last_token,
    }
}

impl PatternWriter {
    pub fn new(tiers: Tiers) -> Self {
        Self { tiers }
    }

    /// Learn one pattern from an STM snapshot.
    ///
    /// `emotives` is the session's per-observation emotive list and
    /// `metadata` its pending metadata, both accumulated since the last
    /// learn/clear. Placement of either within the sequence does not affect
    /// the stored record.
    pub async fn learn(
        &self,
        kb: &KbId,
        events: &[Event],
        emotives: &[EmotiveRecord],
        metadata: &MetadataSets,
        config: &GenesConfig,
    ) -> Result<LearnOutcome> {
        if events.is_empty() {
            return Err(KatoError::Validation(
                "cannot learn from an empty short-term memory".into(),
            ));
        }

        let row = index_row_for(events, config);
        let name = row.name.clone();

        // Tier 1: body. Must land before the index row exists anywhere.
        self.tiers.store.put_if_absent(kb, &name, events).await?;

        // Tier 2: index.
        self.tiers.index.put_if_absent(kb, &row).await?;

        // Tier 3: counters.
        let frequency = self
            .tiers
            .counters
            .incr(kb, &keys::frequency(&name), 1)
            .await?;
        let first_learn = frequency == 1;

        if first_learn {
            self.tiers
                .counters
                .incr(kb, keys::TOTAL_UNIQUE_PATTERNS, 1)
                .await?;
            for symbol in &row.token_set {
                self.tiers
                    .counters
                    .incr(kb, &keys::symbol_pattern_members(symbol), 1)
                    .await?;
            }
        }

        self.tiers
            .counters
            .incr(kb, keys::TOTAL_PATTERN_FREQUENCIES, 1)
            .await?;
        self.tiers
            .counters
            .incr(kb, keys::TOTAL_SYMBOLS_IN_PATTERNS, row.length as i64)
            .await?;

        // Symbol frequency is weighted by within-pattern multiplicity; this
        // learn event contributes a frequency delta of 1.
        let mut multiplicity: std::collections::HashMap<&str, i64> =
            std::collections::HashMap::new();
        for symbol in events.iter().flatten() {
            *multiplicity.entry(symbol.as_str()).or_default() += 1;
        }
        let mut symbols: Vec<_> = multiplicity.into_iter().collect();
        symbols.sort();
        for (symbol, count) in symbols {
            self.tiers
                .counters
                .incr(kb, &keys::symbol_frequency(symbol), count)
                .await?;
        }

        self.merge_emotives(kb, &name, emotives, config.persistence)
            .await?;
        self.merge_metadata(kb, &name, metadata).await?;

        // Stored predictions were computed against the previous KB state.
        self.tiers.counters.delete_prefix(kb, "prediction:").await?;

        tracing::debug!(%kb, %name, frequency, first_learn, "Learned pattern");

        Ok(LearnOutcome {
            name,
            frequency,
            first_learn,
        })
    }

    async fn merge_emotives(
        &self,
        kb: &KbId,
        name: &str,
        emotives: &[EmotiveRecord],
        persistence: usize,
    ) -> Result<()> {
        let key = keys::emotives(name);
        let mut window = match self.tiers.counters.get_json(kb, &key).await? {
            Some(value) => serde_json::from_value::<EmotiveWindow>(value)?,
            None => EmotiveWindow::new(),
        };
        window.push_and_truncate(emotives.iter().cloned(), persistence);
        self.tiers
            .counters
            .put_json(kb, &key, &serde_json::to_value(&window)?)
            .await
    }

    async fn merge_metadata(&self, kb: &KbId, name: &str, metadata: &MetadataSets) -> Result<()> {
        if metadata.is_empty() {
            return Ok(());
        }
        let key = keys::metadata(name);
        let mut merged = match self.tiers.counters.get_json(kb, &key).await? {
            Some(value) => serde_json::from_value::<MetadataSets>(value)?,
            None => MetadataSets::new(),
        };
        merged.union_sets(metadata);
        self.tiers
            .counters
            .put_json(kb, &key, &serde_json::to_value(&merged)?)
            .await
    }

    /// Rebuild missing index rows from stored bodies.
    ///
    /// Covers the crash window between the body and index writes. Returns
    /// the number of rows backfilled.
    pub async fn repair_index(&self, kb: &KbId, config: &GenesConfig) -> Result<u64> {
        let mut repaired = 0u64;
        for name in self.tiers.store.scan_names(kb).await? {
            if self.tiers.index.get(kb, &name).await?.is_some() {
                continue;
            }
            let Some(events) = self.tiers.store.get(kb, &name).await? else {
                continue;
            };
            let row = index_row_for(&events, config);
            if self.tiers.index.put_if_absent(kb, &row).await? {
                repaired += 1;
                tracing::info!(%kb, %name, "Rebuilt missing index row");
            }
        }
        Ok(repaired)
    }
}
