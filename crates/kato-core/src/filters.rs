//! Candidate filter pipeline
//!
//! Reduces the KB's full pattern set to a small candidate set before the
//! expensive similarity pass. Stages run in configured order, each consuming
//! the previous stage's survivors; an empty pipeline scores every pattern.
//! All stages read only the columnar index tier, so the pipeline is pure
//! given the index contents and the observed features.

use std::collections::HashSet;

use crate::config::{FilterStage, GenesConfig};
use crate::error::Result;
use crate::observation::Event;
use crate::pattern::indexing::{MinHasher, SequenceFeatures, jaccard, overlap};
use crate::storage::{IndexRow, KbId, PatternIndex};

/// Observed-STM features for one predict call
pub struct ObservedFeatures {
    pub features: SequenceFeatures,
}

impl ObservedFeatures {
    pub fn derive(events: &[Event], config: &GenesConfig) -> Self {
        let hasher = MinHasher::new(config.minhash_num_hashes);
        Self {
            features: SequenceFeatures::derive(
                events,
                &hasher,
                config.minhash_bands,
                config.minhash_rows,
            ),
        }
    }
}

/// Run the configured stages over the KB's index rows.
///
/// Short-circuits to empty when the STM has fewer than 2 events (no
/// prediction is possible, so no candidate is useful). A MinHash stage in
/// first position is evaluated as a keyed band lookup instead of a scan;
/// the surviving set is identical either way.
pub async fn run_pipeline(
    index: &dyn PatternIndex,
    kb: &KbId,
    stm_events: &[Event],
    config: &GenesConfig,
) -> Result<Vec<IndexRow>> {
    if stm_events.len() < 2 {
        return Ok(Vec::new());
    }

    let observed = ObservedFeatures::derive(stm_events, config);
    let minhash_first = config.filter_pipeline.first() == Some(&FilterStage::Minhash);

    let mut candidates = if minhash_first {
        index
            .rows_for_bands(kb, &observed.features.lsh_bands)
            .await?
    } else {
        index.all_rows(kb).await?
    };

    let remaining = if minhash_first {
        &config.filter_pipeline[1..]
    } else {
        &config.filter_pipeline[..]
    };
    for stage in remaining {
        candidates = apply_stage(*stage, candidates, &observed, config);
        if candidates.is_empty() {
            break;
        }
    }

    Ok(candidates)
}

fn apply_stage(
    stage: FilterStage,
    candidates: Vec<IndexRow>,
    observed: &ObservedFeatures,
    config: &GenesConfig,
) -> Vec<IndexRow> {
    let obs = &observed.features;
    match stage {
        FilterStage::Length => {
            let min = (config.length_min_ratio * obs.length as f64).floor() as usize;
            let max = (config.length_max_ratio * obs.length as f64).ceil() as usize;
            candidates
                .into_iter()
                .filter(|row| row.length >= min && row.length <= max)
                .collect()
        }
        FilterStage::Jaccard => candidates
            .into_iter()
            .filter(|row| {
                jaccard(&obs.token_set, &row.token_set) >= config.jaccard_threshold
                    && overlap(&obs.token_set, &row.token_set) >= config.jaccard_min_overlap
            })
            .collect(),
        FilterStage::Minhash => {
            // Approximate Jaccard >= minhash_threshold: a candidate
            // qualifies when it shares at least one band hash.
            let observed_bands: HashSet<u64> = obs.lsh_bands.iter().copied().collect();
            candidates
                .into_iter()
                .filter(|row| row.lsh_bands.iter().any(|band| observed_bands.contains(band)))
                .collect()
        }
        FilterStage::Prefix => candidates
            .into_iter()
            .filter(|row| row.first_token == obs.first_token)
            .collect(),
        FilterStage::Suffix => candidates
            .into_iter()
            .filter(|row| row.last_token == obs.last_token)
            .collect(),
    }
}
