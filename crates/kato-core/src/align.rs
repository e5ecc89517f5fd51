//! Temporal alignment
//!
//! Partitions a matched pattern into past / present / future relative to the
//! observed STM, and computes the per-event missing and extras sets plus
//! fuzzy-match anomalies.
//!
//! Alignment contract:
//! - `missing` aligns 1-to-1 with `present` (pattern events);
//! - `extras` aligns 1-to-1 with the STM (observed events);
//! - `past ++ present ++ future` reconstructs the pattern;
//! - an observed (matched) symbol never appears in `missing`;
//! - every missing symbol comes from some present event;
//! - exact matches never appear in `anomalies`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::observation::Event;

/// A fuzzy token match: an observed symbol that did not exactly match any
/// pattern symbol but resembled one at or above the configured threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub observed: String,
    pub expected: String,
    pub similarity: f64,
}

/// Temporal decomposition of a pattern against an observed STM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalAlignment {
    pub past: Vec<Event>,
    pub present: Vec<Event>,
    pub future: Vec<Event>,
    /// `missing[i]`: symbols of `present[i]` not observed in its aligned
    /// STM event
    pub missing: Vec<Vec<String>>,
    /// `extras[j]`: symbols of STM event `j` not expected by its aligned
    /// present event
    pub extras: Vec<Vec<String>>,
    /// Observed symbols that exactly matched a pattern symbol
    pub matches: Vec<String>,
    pub anomalies: Vec<Anomaly>,
}

fn distinct(event: &Event) -> Vec<String> {
    event.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

fn shares_symbol(a: &Event, symbols: &BTreeSet<&str>) -> bool {
    a.iter().any(|s| symbols.contains(s.as_str()))
}

/// Align a pattern sequence against the observed STM.
///
/// `fuzzy_threshold` of 0 disables the anomaly pass.
pub fn align_temporal(pattern: &[Event], stm: &[Event], fuzzy_threshold: f64) -> TemporalAlignment {
    let stm_symbols: BTreeSet<&str> = stm.iter().flatten().map(String::as_str).collect();

    // Present window: first through last pattern event sharing any symbol
    // with any STM event.
    let first = pattern.iter().position(|e| shares_symbol(e, &stm_symbols));
    let Some(first) = first else {
        // No overlap anywhere: the whole pattern is past, everything
        // observed is unexpected.
        return TemporalAlignment {
            past: pattern.to_vec(),
            extras: stm.iter().map(distinct).collect(),
            ..Default::default()
        };
    };
    let last = pattern
        .iter()
        .rposition(|e| shares_symbol(e, &stm_symbols))
        .unwrap_or(first);

    let past = pattern[..first].to_vec();
    let present = pattern[first..=last].to_vec();
    let future = pattern[last + 1..].to_vec();

    // Greedy in-order event alignment: each STM event takes the earliest
    // not-yet-passed present event it shares a symbol with.
    let mut aligned: Vec<Option<usize>> = vec![None; stm.len()];
    let mut cursor = 0usize;
    for (j, observed_event) in stm.iter().enumerate() {
        let observed_set: BTreeSet<&str> = observed_event.iter().map(String::as_str).collect();
        for (k, present_event) in present.iter().enumerate().skip(cursor) {
            if shares_symbol(present_event, &observed_set) {
                aligned[j] = Some(k);
                cursor = k + 1;
                break;
            }
        }
    }

    let mut missing: Vec<Vec<String>> = present.iter().map(distinct).collect();
    let mut extras: Vec<Vec<String>> = Vec::with_capacity(stm.len());
    let mut matches: Vec<String> = Vec::new();

    for (j, observed_event) in stm.iter().enumerate() {
        match aligned[j] {
            Some(k) => {
                let expected: BTreeSet<&str> =
                    present[k].iter().map(String::as_str).collect();
                let mut event_extras: Vec<String> = Vec::new();
                for symbol in distinct(observed_event) {
                    if expected.contains(symbol.as_str()) {
                        matches.push(symbol);
                    } else {
                        event_extras.push(symbol);
                    }
                }
                let observed_set: BTreeSet<&str> =
                    observed_event.iter().map(String::as_str).collect();
                missing[k].retain(|s| !observed_set.contains(s.as_str()));
                extras.push(event_extras);
            }
            None => extras.push(distinct(observed_event)),
        }
    }

    let mut alignment = TemporalAlignment {
        past,
        present,
        future,
        missing,
        extras,
        matches,
        anomalies: Vec::new(),
    };

    if fuzzy_threshold > 0.0 {
        fuzzy_pass(&mut alignment, &aligned, fuzzy_threshold);
    }

    alignment
}

/// Pair leftover extras with leftover missing symbols by string similarity.
///
/// An extra symbol from an aligned STM event is compared against its own
/// present event's missing set; an extra from an unaligned event is compared
/// against every missing set. The best pairing at or above the threshold
/// becomes an anomaly and both symbols leave their lists.
fn fuzzy_pass(alignment: &mut TemporalAlignment, aligned: &[Option<usize>], threshold: f64) {
    for (j, event_extras) in alignment.extras.iter_mut().enumerate() {
        let mut remaining: Vec<String> = Vec::with_capacity(event_extras.len());
        for observed in event_extras.drain(..) {
            let pool: Vec<usize> = match aligned.get(j).copied().flatten() {
                Some(k) => vec![k],
                None => (0..alignment.missing.len()).collect(),
            };

            let mut best: Option<(f64, usize, String)> = None;
            for k in pool {
                for expected in &alignment.missing[k] {
                    let similarity = strsim::normalized_levenshtein(&observed, expected);
                    if similarity < threshold {
                        continue;
                    }
                    let better = match &best {
                        None => true,
                        Some((best_sim, _, best_expected)) => {
                            similarity > *best_sim
                                || (similarity == *best_sim && expected < best_expected)
                        }
                    };
                    if better {
                        best = Some((similarity, k, expected.clone()));
                    }
                }
            }

            match best {
                Some((similarity, k, expected)) => {
                    alignment.missing[k].retain(|s| *s != expected);
                    alignment.anomalies.push(Anomaly {
                        observed,
                        expected,
                        similarity,
                    });
                }
                None => remaining.push(observed),
            }
        }
        *event_extras = remaining;
    }
}
