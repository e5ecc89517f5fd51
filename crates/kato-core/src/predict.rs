//! Prediction assembly
//!
//! For each candidate surviving the filter pipeline and the similarity
//! cutoff, the assembler joins the pattern body with its counter-tier state
//! and computes the full metric set. Results for an unchanged STM are cached
//! twice: a bounded in-process LRU and a stored list under
//! `{kb_id}:prediction:{unique_id}`, both invalidated when the KB changes.
//!
//! Metric definitions that the reference left undocumented are frozen here:
//!
//! - `confidence` — matched symbols over the present window's symbol count
//! - `evidence` — matched symbols over the whole pattern's symbol count
//! - `snr` — matched symbols over matched plus unexpected symbols
//! - `fragmentation` — extra contiguous match blocks over possible breaks
//! - `predictive_information` — future share of the pattern, weighted by
//!   similarity

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::align::{Anomaly, align_temporal};
use crate::config::{GenesConfig, RankSortAlgo};
use crate::emotives::{EmotiveWindow, MetadataSets};
use crate::error::Result;
use crate::filters::run_pipeline;
use crate::observation::Event;
use crate::pattern::stm_unique_id;
use crate::similarity::{align_with_cutoff, contiguous_runs};
use crate::stats::EngineStats;
use crate::storage::{KbId, Tiers, keys};

/// In-process prediction cache capacity
const PREDICTION_CACHE_CAPACITY: usize = 512;

/// One assembled prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub frequency: i64,
    pub matches: Vec<String>,
    pub past: Vec<Event>,
    pub present: Vec<Event>,
    pub future: Vec<Event>,
    pub missing: Vec<Vec<String>>,
    pub extras: Vec<Vec<String>>,
    pub anomalies: Vec<Anomaly>,
    pub similarity: f64,
    pub evidence: f64,
    pub confidence: f64,
    pub snr: f64,
    pub fragmentation: f64,
    pub entropy: f64,
    pub normalized_entropy: f64,
    pub global_normalized_entropy: f64,
    pub potential: f64,
    pub bayesian_prior: f64,
    pub bayesian_likelihood: f64,
    pub bayesian_posterior: f64,
    pub tfidf_score: f64,
    pub predictive_information: f64,
    pub emotives: BTreeMap<String, f64>,
    pub metadata: MetadataSets,
}

impl Prediction {
    /// Value of the configured ranking key
    pub fn rank_key(&self, algo: RankSortAlgo) -> f64 {
        match algo {
            RankSortAlgo::Similarity => self.similarity,
            RankSortAlgo::Potential => self.potential,
            RankSortAlgo::Frequency => self.frequency as f64,
            RankSortAlgo::Confidence => self.confidence,
            RankSortAlgo::Evidence => self.evidence,
            RankSortAlgo::Snr => self.snr,
            RankSortAlgo::Fragmentation => self.fragmentation,
            RankSortAlgo::NormalizedEntropy => self.normalized_entropy,
            RankSortAlgo::BayesianPosterior => self.bayesian_posterior,
            RankSortAlgo::BayesianPrior => self.bayesian_prior,
            RankSortAlgo::BayesianLikelihood => self.bayesian_likelihood,
            RankSortAlgo::TfidfScore => self.tfidf_score,
            RankSortAlgo::PredictiveInformation => self.predictive_information,
        }
    }
}

/// Shannon entropy in bits of the symbol distribution across `events`
fn symbol_entropy(events: &[Event]) -> f64 {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    for symbol in events.iter().flatten() {
        *counts.entry(symbol.as_str()).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Per-KB global totals read once per predict call
struct KbTotals {
    total_pattern_frequencies: i64,
    total_unique_patterns: i64,
    unique_symbols: u64,
}

/// Prediction assembler with two-level caching
pub struct PredictionAssembler {
    tiers: Tiers,
    stats: Arc<EngineStats>,
    cache: Mutex<LruCache<(String, u64, String), Vec<Prediction>>>,
    /// Per-KB generation, bumped on any KB mutation to drop stale entries
    generations: DashMap<String, u64>,
}

impl PredictionAssembler {
    pub fn new(tiers: Tiers, stats: Arc<EngineStats>) -> Self {
        Self {
            tiers,
            stats,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(PREDICTION_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            generations: DashMap::new(),
        }
    }

    /// Drop in-process cache entries for a KB (call after learn or clear)
    pub fn invalidate(&self, kb: &KbId) {
        self.generations
            .entry(kb.as_str().to_string())
            .and_modify(|g| *g += 1)
            .or_insert(1);
    }

    fn generation(&self, kb: &KbId) -> u64 {
        self.generations.get(kb.as_str()).map(|g| *g).unwrap_or(0)
    }

    async fn totals(&self, kb: &KbId) -> Result<KbTotals> {
        let total_pattern_frequencies = self
            .tiers
            .counters
            .get_int(kb, keys::TOTAL_PATTERN_FREQUENCIES)
            .await?
            .unwrap_or(0);
        let total_unique_patterns = self
            .tiers
            .counters
            .get_int(kb, keys::TOTAL_UNIQUE_PATTERNS)
            .await?
            .unwrap_or(0);
        let unique_symbols = self
            .tiers
            .counters
            .count_prefix(kb, keys::SYMBOL_PMF_PREFIX)
            .await?;
        Ok(KbTotals {
            total_pattern_frequencies,
            total_unique_patterns,
            unique_symbols,
        })
    }

    /// Assemble the ranked prediction list for an STM snapshot.
    ///
    /// Repeated calls for an unchanged STM and KB return bit-identical
    /// lists (served from cache when available, recomputed deterministically
    /// when not).
    pub async fn predictions_for(
        &self,
        kb: &KbId,
        stm_events: &[Event],
        config: &GenesConfig,
    ) -> Result<Vec<Prediction>> {
        if stm_events.len() < 2 {
            return Ok(Vec::new());
        }

        let unique_id = stm_unique_id(stm_events);
        let generation = self.generation(kb);
        let cache_key = (kb.as_str().to_string(), generation, unique_id.clone());

        if let Some(cached) = self.cache.lock().get(&cache_key) {
            self.stats.prediction_cache_hit();
            return Ok(cached.clone());
        }

        if let Some(stored) = self
            .tiers
            .counters
            .get_json(kb, &keys::prediction(&unique_id))
            .await?
        {
            if let Ok(predictions) = serde_json::from_value::<Vec<Prediction>>(stored) {
                self.stats.prediction_cache_hit();
                self.cache.lock().put(cache_key, predictions.clone());
                return Ok(predictions);
            }
        }

        let predictions = self.assemble(kb, stm_events, config).await?;

        self.tiers
            .counters
            .put_json(
                kb,
                &keys::prediction(&unique_id),
                &serde_json::to_value(&predictions)?,
            )
            .await?;
        self.cache.lock().put(cache_key, predictions.clone());
        self.stats.predictions_served();

        Ok(predictions)
    }

    async fn assemble(
        &self,
        kb: &KbId,
        stm_events: &[Event],
        config: &GenesConfig,
    ) -> Result<Vec<Prediction>> {
        let candidates = run_pipeline(self.tiers.index.as_ref(), kb, stm_events, config).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let totals = self.totals(kb).await?;
        let obs_flat: Vec<String> = stm_events.iter().flatten().cloned().collect();

        let mut predictions: Vec<Prediction> = Vec::new();
        for row in candidates {
            let body = match self.tiers.store.get(kb, &row.name).await? {
                Some(events) => events,
                None if !row.pattern_data.is_empty() => {
                    // Index row without a body is a consistency violation;
                    // the columnar copy keeps the KB readable.
                    self.stats.consistency_violation();
                    tracing::warn!(
                        %kb,
                        name = %row.name,
                        "Index row has no matching body; serving columnar copy"
                    );
                    row.pattern_data.clone()
                }
                None => {
                    self.stats.consistency_violation();
                    tracing::warn!(%kb, name = %row.name, "Index row has no matching body");
                    continue;
                }
            };

            let pat_flat: Vec<String> = body.iter().flatten().cloned().collect();
            let Some(lcs) = align_with_cutoff(&obs_flat, &pat_flat, config.recall_threshold)
            else {
                continue;
            };

            let temporal = align_temporal(&body, stm_events, config.fuzzy_token_threshold);

            // Counters may be absent for a pattern written moments before a
            // crash; treat frequency as 1.
            let frequency = self
                .tiers
                .counters
                .get_int(kb, &keys::frequency(&row.name))
                .await?
                .unwrap_or(1);

            let emotives = match self
                .tiers
                .counters
                .get_json(kb, &keys::emotives(&row.name))
                .await?
            {
                Some(value) => serde_json::from_value::<EmotiveWindow>(value)
                    .unwrap_or_default()
                    .averages(),
                None => BTreeMap::new(),
            };

            let metadata = match self
                .tiers
                .counters
                .get_json(kb, &keys::metadata(&row.name))
                .await?
            {
                Some(value) => serde_json::from_value(value).unwrap_or_default(),
                None => MetadataSets::new(),
            };

            let pattern_length = pat_flat.len();
            let match_count = temporal.matches.len();
            let present_symbols: usize = temporal.present.iter().map(|e| e.len()).sum();
            let extras_total: usize = temporal.extras.iter().map(|e| e.len()).sum();
            let future_symbols: usize = temporal.future.iter().map(|e| e.len()).sum();

            let entropy = symbol_entropy(&temporal.future);
            let normalized_entropy =
                entropy / (row.token_count.max(2) as f64).log2();
            let global_normalized_entropy =
                entropy / (totals.unique_symbols.max(2) as f64).log2();

            let confidence = if present_symbols == 0 {
                0.0
            } else {
                match_count as f64 / present_symbols as f64
            };
            let evidence = match_count as f64 / pattern_length.max(1) as f64;
            let snr = if match_count + extras_total == 0 {
                0.0
            } else {
                match_count as f64 / (match_count + extras_total) as f64
            };
            let runs = contiguous_runs(&lcs.pairs);
            let fragmentation = if lcs.matches <= 1 {
                0.0
            } else {
                (runs.saturating_sub(1)) as f64 / (lcs.matches - 1) as f64
            };
            let potential = lcs.similarity * (1.0 - normalized_entropy);
            let predictive_information =
                (future_symbols as f64 / pattern_length.max(1) as f64) * lcs.similarity;

            let tfidf_score =
                self.tfidf(kb, &temporal.matches, &pat_flat, &totals).await?;

            let bayesian_prior =
                frequency as f64 / totals.total_pattern_frequencies.max(1) as f64;

            predictions.push(Prediction {
                name: row.name,
                frequency,
                matches: temporal.matches.clone(),
                past: temporal.past,
                present: temporal.present,
                future: temporal.future,
                missing: temporal.missing,
                extras: temporal.extras,
                anomalies: temporal.anomalies,
                similarity: lcs.similarity,
                evidence,
                confidence,
                snr,
                fragmentation,
                entropy,
                normalized_entropy,
                global_normalized_entropy,
                potential,
                bayesian_prior,
                bayesian_likelihood: lcs.similarity,
                bayesian_posterior: 0.0,
                tfidf_score,
                predictive_information,
                emotives,
                metadata,
            });
        }

        // Posterior normalizes across the candidates in this prediction set.
        let evidence_mass: f64 = predictions
            .iter()
            .map(|p| p.bayesian_likelihood * p.bayesian_prior)
            .sum();
        if evidence_mass > 0.0 {
            for prediction in &mut predictions {
                prediction.bayesian_posterior =
                    (prediction.bayesian_likelihood * prediction.bayesian_prior) / evidence_mass;
            }
        }

        let algo = config.rank_sort_algo;
        predictions.sort_by(|a, b| {
            b.rank_key(algo)
                .total_cmp(&a.rank_key(algo))
                .then_with(|| a.name.cmp(&b.name))
        });
        predictions.truncate(config.max_predictions);

        Ok(predictions)
    }

    /// `Σ_s tf(s, pattern) · idf(s)` over distinct matched symbols, with
    /// `tf` the within-pattern share and `idf = ln(unique_patterns / pmf)`
    async fn tfidf(
        &self,
        kb: &KbId,
        matches: &[String],
        pat_flat: &[String],
        totals: &KbTotals,
    ) -> Result<f64> {
        if pat_flat.is_empty() || totals.total_unique_patterns == 0 {
            return Ok(0.0);
        }
        let mut distinct: Vec<&String> = matches.iter().collect();
        distinct.sort();
        distinct.dedup();

        let mut score = 0.0;
        for symbol in distinct {
            let count = pat_flat.iter().filter(|s| *s == symbol).count();
            if count == 0 {
                continue;
            }
            let tf = count as f64 / pat_flat.len() as f64;
            let pmf = self
                .tiers
                .counters
                .get_int(kb, &keys::symbol_pattern_members(symbol))
                .await?
                .unwrap_or(1)
                .max(1);
            let idf = (totals.total_unique_patterns as f64 / pmf as f64).ln();
            score += tf * idf.max(0.0);
        }
        Ok(score)
    }
}
