//! In-memory tier implementations
//!
//! Lock-striped maps with the same namespacing and put-if-absent semantics as
//! the SQLite backend. The default for tests and for ephemeral deployments
//! where persistence across restarts is not needed.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::observation::Event;

use super::{CounterStore, IndexRow, KbId, PatternIndex, PatternStore};

#[derive(Debug, Clone)]
enum KvValue {
    Int(i64),
    Json(serde_json::Value),
}

/// One struct backing all three tiers
#[derive(Default)]
pub struct MemoryTiers {
    bodies: DashMap<(String, String), Vec<Event>>,
    rows: DashMap<(String, String), IndexRow>,
    /// Reverse band index: (kb_id, band hash) -> pattern names
    bands: DashMap<(String, u64), std::collections::BTreeSet<String>>,
    kv: DashMap<(String, String), KvValue>,
}

impl MemoryTiers {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(kb: &KbId, suffix: &str) -> (String, String) {
        (kb.as_str().to_string(), suffix.to_string())
    }
}

#[async_trait]
impl PatternStore for MemoryTiers {
    async fn put_if_absent(&self, kb: &KbId, name: &str, events: &[Event]) -> Result<bool> {
        let entry = self.bodies.entry(Self::key(kb, name));
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(events.to_vec());
                Ok(true)
            }
        }
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<Vec<Event>>> {
        Ok(self.bodies.get(&Self::key(kb, name)).map(|r| r.clone()))
    }

    async fn exists(&self, kb: &KbId, name: &str) -> Result<bool> {
        Ok(self.bodies.contains_key(&Self::key(kb, name)))
    }

    async fn scan_names(&self, kb: &KbId) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .bodies
            .iter()
            .filter(|r| r.key().0 == kb.as_str())
            .map(|r| r.key().1.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let before = self.bodies.len();
        self.bodies.retain(|key, _| key.0 != kb.as_str());
        Ok(before.saturating_sub(self.bodies.len()) as u64)
    }
}

#[async_trait]
impl PatternIndex for MemoryTiers {
    async fn put_if_absent(&self, kb: &KbId, row: &IndexRow) -> Result<bool> {
        let entry = self.rows.entry(Self::key(kb, &row.name));
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(row.clone());
                for band in &row.lsh_bands {
                    self.bands
                        .entry((kb.as_str().to_string(), *band))
                        .or_default()
                        .insert(row.name.clone());
                }
                Ok(true)
            }
        }
    }

    async fn get(&self, kb: &KbId, name: &str) -> Result<Option<IndexRow>> {
        Ok(self.rows.get(&Self::key(kb, name)).map(|r| r.clone()))
    }

    async fn all_rows(&self, kb: &KbId) -> Result<Vec<IndexRow>> {
        let mut rows: Vec<IndexRow> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == kb.as_str())
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn rows_for_bands(&self, kb: &KbId, bands: &[u64]) -> Result<Vec<IndexRow>> {
        let mut names = std::collections::BTreeSet::new();
        for band in bands {
            if let Some(members) = self.bands.get(&(kb.as_str().to_string(), *band)) {
                names.extend(members.iter().cloned());
            }
        }
        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            if let Some(row) = self.rows.get(&Self::key(kb, &name)) {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let before = self.rows.len();
        self.rows.retain(|key, _| key.0 != kb.as_str());
        self.bands.retain(|key, _| key.0 != kb.as_str());
        Ok(before.saturating_sub(self.rows.len()) as u64)
    }
}

#[async_trait]
impl CounterStore for MemoryTiers {
    async fn incr(&self, kb: &KbId, key: &str, by: i64) -> Result<i64> {
        let mut entry = self
            .kv
            .entry(Self::key(kb, key))
            .or_insert(KvValue::Int(0));
        let next = match entry.value() {
            KvValue::Int(current) => current + by,
            // A JSON value under an integer key is counter corruption; start
            // the counter over rather than guessing.
            KvValue::Json(_) => by,
        };
        *entry.value_mut() = KvValue::Int(next);
        Ok(next)
    }

    async fn get_int(&self, kb: &KbId, key: &str) -> Result<Option<i64>> {
        Ok(self.kv.get(&Self::key(kb, key)).and_then(|v| match v.value() {
            KvValue::Int(i) => Some(*i),
            KvValue::Json(_) => None,
        }))
    }

    async fn get_json(&self, kb: &KbId, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.kv.get(&Self::key(kb, key)).and_then(|v| match v.value() {
            KvValue::Json(j) => Some(j.clone()),
            KvValue::Int(_) => None,
        }))
    }

    async fn put_json(&self, kb: &KbId, key: &str, value: &serde_json::Value) -> Result<()> {
        self.kv
            .insert(Self::key(kb, key), KvValue::Json(value.clone()));
        Ok(())
    }

    async fn delete(&self, kb: &KbId, key: &str) -> Result<bool> {
        Ok(self.kv.remove(&Self::key(kb, key)).is_some())
    }

    async fn count_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        Ok(self
            .kv
            .iter()
            .filter(|r| r.key().0 == kb.as_str() && r.key().1.starts_with(prefix))
            .count() as u64)
    }

    async fn delete_prefix(&self, kb: &KbId, prefix: &str) -> Result<u64> {
        let before = self.kv.len();
        self.kv
            .retain(|key, _| !(key.0 == kb.as_str() && key.1.starts_with(prefix)));
        Ok(before.saturating_sub(self.kv.len()) as u64)
    }

    async fn clear_kb(&self, kb: &KbId) -> Result<u64> {
        let before = self.kv.len();
        self.kv.retain(|key, _| key.0 != kb.as_str());
        Ok(before.saturating_sub(self.kv.len()) as u64)
    }
}
