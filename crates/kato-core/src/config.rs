//! Typed configuration model
//!
//! One fully-resolved record (`GenesConfig`) plus a partial record
//! (`ConfigUpdate`) used for per-session overrides. The effective config for a
//! session is `system defaults ⊕ session overrides`, key-wise. Every update is
//! validated as a whole before any key is applied; a rejected update leaves the
//! previous state untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{KatoError, Result};

// ============================================================================
// ENUM KEYS
// ============================================================================

/// Post-auto-learn STM handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StmMode {
    /// Empty the STM after a learn
    #[default]
    Clear,
    /// Retain the trailing `max_pattern_length - 1` events after a learn
    Rolling,
}

impl StmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StmMode::Clear => "CLEAR",
            StmMode::Rolling => "ROLLING",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "CLEAR" => Ok(StmMode::Clear),
            "ROLLING" => Ok(StmMode::Rolling),
            other => Err(KatoError::Validation(format!(
                "stm_mode must be CLEAR or ROLLING, got '{other}'"
            ))),
        }
    }
}

/// MinHash parameter set selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerType {
    /// 100 hashes, 20 bands x 5 rows
    #[default]
    Minhash100,
    /// 200 hashes, 40 bands x 5 rows (finer approximate-Jaccard resolution)
    Minhash200,
}

impl IndexerType {
    /// (num_hashes, bands, rows) for this parameter set
    pub fn params(&self) -> (usize, usize, usize) {
        match self {
            IndexerType::Minhash100 => (100, 20, 5),
            IndexerType::Minhash200 => (200, 40, 5),
        }
    }
}

/// Key by which ranked candidates are sorted, descending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSortAlgo {
    Similarity,
    #[default]
    Potential,
    Frequency,
    Confidence,
    Evidence,
    Snr,
    Fragmentation,
    NormalizedEntropy,
    BayesianPosterior,
    BayesianPrior,
    BayesianLikelihood,
    TfidfScore,
    PredictiveInformation,
}

impl RankSortAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankSortAlgo::Similarity => "similarity",
            RankSortAlgo::Potential => "potential",
            RankSortAlgo::Frequency => "frequency",
            RankSortAlgo::Confidence => "confidence",
            RankSortAlgo::Evidence => "evidence",
            RankSortAlgo::Snr => "snr",
            RankSortAlgo::Fragmentation => "fragmentation",
            RankSortAlgo::NormalizedEntropy => "normalized_entropy",
            RankSortAlgo::BayesianPosterior => "bayesian_posterior",
            RankSortAlgo::BayesianPrior => "bayesian_prior",
            RankSortAlgo::BayesianLikelihood => "bayesian_likelihood",
            RankSortAlgo::TfidfScore => "tfidf_score",
            RankSortAlgo::PredictiveInformation => "predictive_information",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s {
            "similarity" => Ok(RankSortAlgo::Similarity),
            "potential" => Ok(RankSortAlgo::Potential),
            "frequency" => Ok(RankSortAlgo::Frequency),
            "confidence" => Ok(RankSortAlgo::Confidence),
            "evidence" => Ok(RankSortAlgo::Evidence),
            "snr" => Ok(RankSortAlgo::Snr),
            "fragmentation" => Ok(RankSortAlgo::Fragmentation),
            "normalized_entropy" => Ok(RankSortAlgo::NormalizedEntropy),
            "bayesian_posterior" => Ok(RankSortAlgo::BayesianPosterior),
            "bayesian_prior" => Ok(RankSortAlgo::BayesianPrior),
            "bayesian_likelihood" => Ok(RankSortAlgo::BayesianLikelihood),
            "tfidf_score" => Ok(RankSortAlgo::TfidfScore),
            "predictive_information" => Ok(RankSortAlgo::PredictiveInformation),
            other => Err(KatoError::Configuration(format!(
                "unrecognized rank_sort_algo '{other}'"
            ))),
        }
    }
}

/// One stage of the candidate filter pipeline, selected by wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStage {
    Length,
    Jaccard,
    Minhash,
    Prefix,
    Suffix,
}

impl FilterStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStage::Length => "length",
            FilterStage::Jaccard => "jaccard",
            FilterStage::Minhash => "minhash",
            FilterStage::Prefix => "prefix",
            FilterStage::Suffix => "suffix",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s {
            "length" => Ok(FilterStage::Length),
            "jaccard" => Ok(FilterStage::Jaccard),
            "minhash" => Ok(FilterStage::Minhash),
            "prefix" => Ok(FilterStage::Prefix),
            "suffix" => Ok(FilterStage::Suffix),
            other => Err(KatoError::Configuration(format!(
                "unrecognized filter stage '{other}'"
            ))),
        }
    }
}

// ============================================================================
// FULL CONFIG RECORD
// ============================================================================

/// Fully-resolved engine configuration for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesConfig {
    /// Minimum similarity for a candidate to become a prediction
    pub recall_threshold: f64,
    /// STM length that triggers auto-learn; 0 disables
    pub max_pattern_length: usize,
    /// Rolling-emotive window size per pattern
    pub persistence: usize,
    /// Upper bound on returned predictions
    pub max_predictions: usize,
    /// Post-auto-learn STM handling
    pub stm_mode: StmMode,
    /// Enables symbol-sort canonicalization
    pub use_token_matching: bool,
    /// Sort symbols within each event (auto-toggled with `use_token_matching`)
    pub sort_symbols: bool,
    /// MinHash parameter set
    pub indexer_type: IndexerType,
    /// Ranking key for predictions
    pub rank_sort_algo: RankSortAlgo,
    /// Ordered filter stages; empty means score all patterns
    pub filter_pipeline: Vec<FilterStage>,
    pub length_min_ratio: f64,
    pub length_max_ratio: f64,
    pub jaccard_threshold: f64,
    pub jaccard_min_overlap: usize,
    pub minhash_threshold: f64,
    pub minhash_bands: usize,
    pub minhash_rows: usize,
    pub minhash_num_hashes: usize,
    /// Fuzzy anomaly acceptance cutoff; 0 disables fuzzy matching
    pub fuzzy_token_threshold: f64,
}

impl Default for GenesConfig {
    fn default() -> Self {
        Self {
            recall_threshold: 0.1,
            max_pattern_length: 0,
            persistence: 5,
            max_predictions: 100,
            stm_mode: StmMode::Clear,
            use_token_matching: true,
            sort_symbols: true,
            indexer_type: IndexerType::Minhash100,
            rank_sort_algo: RankSortAlgo::Potential,
            filter_pipeline: Vec::new(),
            length_min_ratio: 0.5,
            length_max_ratio: 2.0,
            jaccard_threshold: 0.3,
            jaccard_min_overlap: 2,
            minhash_threshold: 0.7,
            minhash_bands: 20,
            minhash_rows: 5,
            minhash_num_hashes: 100,
            fuzzy_token_threshold: 0.0,
        }
    }
}

impl GenesConfig {
    /// System defaults, seeded from `KATO_*` environment variables where set.
    ///
    /// Unparseable environment values are ignored with a warning rather than
    /// failing startup; explicit config updates are validated strictly.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            match std::env::var(key) {
                Ok(raw) => match raw.parse::<T>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!("Ignoring unparseable {key}={raw}");
                        None
                    }
                },
                Err(_) => None,
            }
        }

        if let Some(v) = env_parse::<f64>("KATO_RECALL_THRESHOLD") {
            cfg.recall_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("KATO_MAX_PATTERN_LENGTH") {
            cfg.max_pattern_length = v;
        }
        if let Some(v) = env_parse::<usize>("KATO_PERSISTENCE") {
            cfg.persistence = v;
        }
        if let Some(v) = env_parse::<usize>("KATO_MAX_PREDICTIONS") {
            cfg.max_predictions = v;
        }
        if let Ok(raw) = std::env::var("KATO_STM_MODE") {
            match StmMode::parse_name(&raw) {
                Ok(mode) => cfg.stm_mode = mode,
                Err(_) => tracing::warn!("Ignoring unparseable KATO_STM_MODE={raw}"),
            }
        }
        if let Some(v) = env_parse::<f64>("KATO_FUZZY_TOKEN_THRESHOLD") {
            cfg.fuzzy_token_threshold = v;
        }
        if let Ok(raw) = std::env::var("KATO_RANK_SORT_ALGO") {
            match RankSortAlgo::parse_name(&raw) {
                Ok(algo) => cfg.rank_sort_algo = algo,
                Err(_) => tracing::warn!("Ignoring unparseable KATO_RANK_SORT_ALGO={raw}"),
            }
        }

        if let Err(e) = cfg.validate() {
            tracing::warn!("Environment config invalid ({e}); falling back to defaults");
            return Self::default();
        }
        cfg
    }

    /// Validate the whole record, returning the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.recall_threshold) {
            return Err(KatoError::Validation(format!(
                "recall_threshold must be in [0,1], got {}",
                self.recall_threshold
            )));
        }
        if !(1..=100).contains(&self.persistence) {
            return Err(KatoError::Validation(format!(
                "persistence must be in [1,100], got {}",
                self.persistence
            )));
        }
        if !(1..=10_000).contains(&self.max_predictions) {
            return Err(KatoError::Validation(format!(
                "max_predictions must be in [1,10000], got {}",
                self.max_predictions
            )));
        }
        if self.length_min_ratio <= 0.0 || self.length_max_ratio <= 0.0 {
            return Err(KatoError::Validation(
                "length_min_ratio and length_max_ratio must be > 0".into(),
            ));
        }
        if self.length_min_ratio > self.length_max_ratio {
            return Err(KatoError::Validation(
                "length_min_ratio must not exceed length_max_ratio".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jaccard_threshold) {
            return Err(KatoError::Validation(format!(
                "jaccard_threshold must be in [0,1], got {}",
                self.jaccard_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.minhash_threshold) {
            return Err(KatoError::Validation(format!(
                "minhash_threshold must be in [0,1], got {}",
                self.minhash_threshold
            )));
        }
        if self.minhash_bands * self.minhash_rows != self.minhash_num_hashes {
            return Err(KatoError::Validation(format!(
                "minhash_bands * minhash_rows must equal minhash_num_hashes \
                 ({} * {} != {})",
                self.minhash_bands, self.minhash_rows, self.minhash_num_hashes
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_token_threshold) {
            return Err(KatoError::Validation(format!(
                "fuzzy_token_threshold must be in [0,1], got {}",
                self.fuzzy_token_threshold
            )));
        }
        Ok(())
    }

    /// Apply a validated partial update, returning the merged record.
    ///
    /// The merge is computed on a copy and validated before being returned, so
    /// callers can keep their previous record on error.
    pub fn merged(&self, update: &ConfigUpdate) -> Result<GenesConfig> {
        let mut next = self.clone();

        if let Some(v) = update.recall_threshold {
            next.recall_threshold = v;
        }
        if let Some(v) = update.max_pattern_length {
            if v < 0 {
                return Err(KatoError::Validation(format!(
                    "max_pattern_length must be >= 0, got {v}"
                )));
            }
            next.max_pattern_length = v as usize;
        }
        if let Some(v) = update.persistence {
            if v < 0 {
                return Err(KatoError::Validation(format!(
                    "persistence must be positive, got {v}"
                )));
            }
            next.persistence = v as usize;
        }
        if let Some(v) = update.max_predictions {
            if v < 0 {
                return Err(KatoError::Validation(format!(
                    "max_predictions must be positive, got {v}"
                )));
            }
            next.max_predictions = v as usize;
        }
        if let Some(ref raw) = update.stm_mode {
            next.stm_mode = StmMode::parse_name(raw)?;
        }
        // Auto-toggle: use_token_matching without sort_symbols drags
        // sort_symbols to the same value.
        if let Some(v) = update.use_token_matching {
            next.use_token_matching = v;
            if update.sort_symbols.is_none() {
                next.sort_symbols = v;
            }
        }
        if let Some(v) = update.sort_symbols {
            next.sort_symbols = v;
        }
        if let Some(ref raw) = update.indexer_type {
            next.indexer_type = match raw.as_str() {
                "minhash100" => IndexerType::Minhash100,
                "minhash200" => IndexerType::Minhash200,
                other => {
                    return Err(KatoError::Configuration(format!(
                        "unrecognized indexer_type '{other}'"
                    )));
                }
            };
            let (hashes, bands, rows) = next.indexer_type.params();
            next.minhash_num_hashes = hashes;
            next.minhash_bands = bands;
            next.minhash_rows = rows;
        }
        if let Some(ref raw) = update.rank_sort_algo {
            next.rank_sort_algo = RankSortAlgo::parse_name(raw)?;
        }
        if let Some(ref stages) = update.filter_pipeline {
            next.filter_pipeline = stages
                .iter()
                .map(|s| FilterStage::parse_name(s))
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(v) = update.length_min_ratio {
            next.length_min_ratio = v;
        }
        if let Some(v) = update.length_max_ratio {
            next.length_max_ratio = v;
        }
        if let Some(v) = update.jaccard_threshold {
            next.jaccard_threshold = v;
        }
        if let Some(v) = update.jaccard_min_overlap {
            if v < 0 {
                return Err(KatoError::Validation(format!(
                    "jaccard_min_overlap must be >= 0, got {v}"
                )));
            }
            next.jaccard_min_overlap = v as usize;
        }
        if let Some(v) = update.minhash_threshold {
            next.minhash_threshold = v;
        }
        if let Some(v) = update.minhash_bands {
            next.minhash_bands = v;
        }
        if let Some(v) = update.minhash_rows {
            next.minhash_rows = v;
        }
        if let Some(v) = update.minhash_num_hashes {
            next.minhash_num_hashes = v;
        }
        if let Some(v) = update.fuzzy_token_threshold {
            next.fuzzy_token_threshold = v;
        }

        next.validate()?;
        Ok(next)
    }

    /// Wire representation of the effective config (snake_case keys)
    pub fn to_wire(&self) -> BTreeMap<String, serde_json::Value> {
        use serde_json::json;
        let mut map = BTreeMap::new();
        map.insert("recall_threshold".into(), json!(self.recall_threshold));
        map.insert("max_pattern_length".into(), json!(self.max_pattern_length));
        map.insert("persistence".into(), json!(self.persistence));
        map.insert("max_predictions".into(), json!(self.max_predictions));
        map.insert("stm_mode".into(), json!(self.stm_mode.as_str()));
        map.insert("use_token_matching".into(), json!(self.use_token_matching));
        map.insert("sort_symbols".into(), json!(self.sort_symbols));
        map.insert("rank_sort_algo".into(), json!(self.rank_sort_algo.as_str()));
        map.insert(
            "filter_pipeline".into(),
            json!(
                self.filter_pipeline
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
            ),
        );
        map.insert("length_min_ratio".into(), json!(self.length_min_ratio));
        map.insert("length_max_ratio".into(), json!(self.length_max_ratio));
        map.insert("jaccard_threshold".into(), json!(self.jaccard_threshold));
        map.insert("jaccard_min_overlap".into(), json!(self.jaccard_min_overlap));
        map.insert("minhash_threshold".into(), json!(self.minhash_threshold));
        map.insert("minhash_bands".into(), json!(self.minhash_bands));
        map.insert("minhash_rows".into(), json!(self.minhash_rows));
        map.insert("minhash_num_hashes".into(), json!(self.minhash_num_hashes));
        map.insert(
            "fuzzy_token_threshold".into(),
            json!(self.fuzzy_token_threshold),
        );
        map
    }
}

// ============================================================================
// PARTIAL UPDATE RECORD
// ============================================================================

/// Partial configuration record for session overrides
///
/// Numeric fields that the wire allows to be negative are deserialized as
/// signed so that out-of-range values produce a `Validation` error instead of
/// a serde rejection, matching the original API behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pattern_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_predictions: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stm_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_token_matching: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_symbols: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_sort_algo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_pipeline: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_min_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_max_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jaccard_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jaccard_min_overlap: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minhash_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minhash_bands: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minhash_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minhash_num_hashes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_token_threshold: Option<f64>,
}

impl ConfigUpdate {
    /// Fold another partial record on top of this one (later keys win)
    pub fn overlay(&mut self, other: &ConfigUpdate) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(recall_threshold);
        take!(max_pattern_length);
        take!(persistence);
        take!(max_predictions);
        take!(stm_mode);
        take!(use_token_matching);
        take!(sort_symbols);
        take!(indexer_type);
        take!(rank_sort_algo);
        take!(filter_pipeline);
        take!(length_min_ratio);
        take!(length_max_ratio);
        take!(jaccard_threshold);
        take!(jaccard_min_overlap);
        take!(minhash_threshold);
        take!(minhash_bands);
        take!(minhash_rows);
        take!(minhash_num_hashes);
        take!(fuzzy_token_threshold);
    }
}
