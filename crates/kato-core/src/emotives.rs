//! Emotive windows and metadata accumulation
//!
//! Each pattern carries a bounded window of the per-observation emotive dicts
//! seen during the learn events that produced it, truncated from the front
//! when `persistence` is exceeded, and a metadata map whose per-key value
//! sets grow only via union.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One observation's emotive scalars
pub type EmotiveRecord = BTreeMap<String, f64>;

/// Bounded deque of emotive records stored with a pattern.
///
/// The window is a value type: `push_and_truncate` is the only mutation, so
/// every storage round-trip sees the same front-truncation discipline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotiveWindow {
    entries: Vec<EmotiveRecord>,
}

impl EmotiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<EmotiveRecord>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[EmotiveRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append records, then drop the oldest entries beyond `limit`
    pub fn push_and_truncate(&mut self, records: impl IntoIterator<Item = EmotiveRecord>, limit: usize) {
        self.entries.extend(records);
        if self.entries.len() > limit {
            let excess = self.entries.len() - limit;
            self.entries.drain(..excess);
        }
    }

    /// Per-key arithmetic mean; keys missing from some entries are averaged
    /// only over the entries where present.
    pub fn averages(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for entry in &self.entries {
            for (key, value) in entry {
                let slot = sums.entry(key.clone()).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect()
    }
}

/// Pattern metadata: key to set of values, union-merged across learn events.
///
/// Values keep their JSON shape (string, number, or array element). The set
/// is kept sorted by serialized form so merges are order-independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataSets {
    map: BTreeMap<String, Vec<serde_json::Value>>,
}

impl MetadataSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, Vec<serde_json::Value>>) -> Self {
        let mut this = Self { map };
        for values in this.map.values_mut() {
            values.sort_by_key(|v| v.to_string());
            values.dedup();
        }
        this
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<serde_json::Value>> {
        &self.map
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Union one observation's metadata into the accumulated sets. Array
    /// values contribute their elements; scalars contribute themselves.
    pub fn union_observation(&mut self, metadata: &BTreeMap<String, serde_json::Value>) {
        for (key, value) in metadata {
            let set = self.map.entry(key.clone()).or_default();
            match value {
                serde_json::Value::Array(items) => {
                    for item in items {
                        if !set.contains(item) {
                            set.push(item.clone());
                        }
                    }
                }
                other => {
                    if !set.contains(other) {
                        set.push(other.clone());
                    }
                }
            }
            set.sort_by_key(|v| v.to_string());
        }
    }

    /// Union another accumulated set (used on re-learn merge)
    pub fn union_sets(&mut self, other: &MetadataSets) {
        for (key, values) in &other.map {
            let set = self.map.entry(key.clone()).or_default();
            for value in values {
                if !set.contains(value) {
                    set.push(value.clone());
                }
            }
            set.sort_by_key(|v| v.to_string());
        }
    }
}
