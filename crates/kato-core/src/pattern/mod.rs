//! Pattern identity and records
//!
//! A pattern is an ordered list of events, named by the SHA-1 of its
//! canonical flattening: events joined by `_` within, `|` between. The name
//! is the pattern's identity — two STMs that canonicalize identically always
//! produce the same `PTRN|<hash>`.

pub mod indexing;

use serde::{Deserialize, Serialize};

use crate::emotives::{EmotiveWindow, MetadataSets};
use crate::hashing::sha1_hex;
use crate::observation::Event;

/// Wire prefix for pattern names
pub const PATTERN_PREFIX: &str = "PTRN|";

/// Pipe-joined, underscore-joined flattening of an event sequence.
///
/// Events are assumed already canonicalized (per-event sort happened at
/// observation intake).
pub fn canonical_sequence(events: &[Event]) -> String {
    events
        .iter()
        .map(|event| event.join("_"))
        .collect::<Vec<_>>()
        .join("|")
}

/// `"PTRN|" + sha1_hex(canonical_sequence)`
pub fn pattern_name(events: &[Event]) -> String {
    format!("{PATTERN_PREFIX}{}", sha1_hex(canonical_sequence(events).as_bytes()))
}

/// Deterministic cache id for an STM snapshot, used to key stored
/// prediction lists
pub fn stm_unique_id(events: &[Event]) -> String {
    sha1_hex(canonical_sequence(events).as_bytes())
}

/// Full pattern record as returned by `GET /pattern/{name}`: body joined
/// with the counter-tier state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub name: String,
    pub pattern_data: Vec<Event>,
    pub frequency: i64,
    pub emotives: EmotiveWindow,
    pub metadata: MetadataSets,
    /// Total symbol count (sum over events)
    pub length: usize,
    /// Sorted distinct symbols across all events
    pub token_set: Vec<String>,
}
