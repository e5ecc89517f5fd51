//! Observation intake and event canonicalization
//!
//! An observation is the raw client input: a multiset of string tokens, dense
//! vectors, emotive scalars, and metadata. Canonicalization turns it into a
//! single event — one lexicographically sorted list of symbols — with vectors
//! replaced by `VCTR|<hash>` surrogates. The canonical form is a pure function
//! of the input, which is what makes pattern names reproducible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{KatoError, Result};
use crate::hashing::sha1_hex;

/// One observation as submitted by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Unordered multiset of tokens
    #[serde(default)]
    pub strings: Vec<String>,
    /// Ordered dense vectors; all must share the session's dimensionality
    #[serde(default)]
    pub vectors: Vec<Vec<f64>>,
    /// Emotive name to scalar; last writer wins within one observation
    #[serde(default)]
    pub emotives: BTreeMap<String, f64>,
    /// Arbitrary metadata merged set-union over a pattern's lifetime
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Client-supplied correlation id, echoed in the acknowledgement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

impl Observation {
    /// True when no field carries data; such observations are discarded
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
            && self.vectors.is_empty()
            && self.emotives.is_empty()
            && self.metadata.is_empty()
    }

    /// Validate emotive scalars and vector shape against the session.
    ///
    /// `session_dim` is the dimensionality pinned by the session's first
    /// vector, if any.
    pub fn validate(&self, session_dim: Option<usize>) -> Result<()> {
        for (name, value) in &self.emotives {
            if !value.is_finite() {
                return Err(KatoError::Validation(format!(
                    "emotive '{name}' must be a finite number, got {value}"
                )));
            }
        }
        let mut expected = session_dim;
        for vector in &self.vectors {
            if vector.is_empty() {
                return Err(KatoError::Validation("vectors must be non-empty".into()));
            }
            match expected {
                None => expected = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(KatoError::InvalidVectorDim {
                        expected: dim,
                        got: vector.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A canonicalized observation: one sorted list of symbols
pub type Event = Vec<String>;

/// Surrogate symbol for a dense vector: `VCTR|` + SHA-1 over the
/// little-endian IEEE-754 bytes of the components.
///
/// Identical arrays always map to the same symbol; any component difference
/// diverges.
pub fn vector_symbol(vector: &[f64]) -> String {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    format!("VCTR|{}", sha1_hex(&bytes))
}

/// Canonicalize an observation into an event.
///
/// Strings are sorted lexicographically with duplicates preserved, vector
/// surrogates are appended, and the combined list is re-sorted. With
/// `sort_symbols` off the intake order is preserved (vectors still appended).
pub fn canonicalize(observation: &Observation, sort_symbols: bool) -> Event {
    let mut symbols: Vec<String> = observation.strings.clone();
    if sort_symbols {
        symbols.sort();
    }
    for vector in &observation.vectors {
        symbols.push(vector_symbol(vector));
    }
    if sort_symbols && !observation.vectors.is_empty() {
        symbols.sort();
    }
    symbols
}
