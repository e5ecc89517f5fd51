//! Pre-computed filter indices
//!
//! Everything the candidate filter pipeline needs without touching pattern
//! bodies: length, token set, MinHash signature, and LSH band hashes. The
//! same derivation runs on patterns at learn time and on the observed STM at
//! predict time, so both sides of every filter comparison come from one code
//! path.

use std::collections::BTreeSet;

use sha1::{Digest, Sha1};

use crate::hashing::{splitmix64, token_u64};
use crate::observation::Event;

/// MinHash permutation parameters, derived from a fixed splitmix64 stream so
/// signatures are identical across processes and machines.
#[derive(Debug, Clone)]
pub struct MinHasher {
    /// (odd multiplier, xor mask) per permutation
    params: Vec<(u64, u64)>,
}

impl MinHasher {
    pub fn new(num_hashes: usize) -> Self {
        let params = (0..num_hashes as u64)
            .map(|i| {
                let mut state = 0x6B61_746F_0000_0000 ^ i;
                let multiplier = splitmix64(&mut state) | 1;
                let mask = splitmix64(&mut state);
                (multiplier, mask)
            })
            .collect();
        Self { params }
    }

    pub fn num_hashes(&self) -> usize {
        self.params.len()
    }

    /// Signature over a token set: per permutation, the minimum permuted
    /// token hash. An empty set signs as all `u64::MAX`.
    pub fn signature<'a>(&self, tokens: impl IntoIterator<Item = &'a String>) -> Vec<u64> {
        let hashed: Vec<u64> = tokens.into_iter().map(|t| token_u64(t)).collect();
        self.params
            .iter()
            .map(|&(multiplier, mask)| {
                hashed
                    .iter()
                    .map(|&h| multiplier.wrapping_mul(h ^ mask))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect()
    }
}

/// Hash the rows of one LSH band into a single u64
fn band_hash(rows: &[u64]) -> u64 {
    let mut hasher = Sha1::new();
    for row in rows {
        hasher.update(row.to_be_bytes());
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().unwrap_or([0u8; 8]))
}

/// Split a signature into `bands` hashes of `rows` values each.
///
/// Callers guarantee `bands * rows == signature.len()` (enforced by config
/// validation).
pub fn lsh_bands(signature: &[u64], bands: usize, rows: usize) -> Vec<u64> {
    (0..bands)
        .map(|b| band_hash(&signature[b * rows..(b + 1) * rows]))
        .collect()
}

/// Derived features of an event sequence, shared by patterns (stored in the
/// index tier) and observed STMs (computed on the fly).
#[derive(Debug, Clone)]
pub struct SequenceFeatures {
    pub length: usize,
    pub token_set: Vec<String>,
    pub token_count: usize,
    pub minhash_sig: Vec<u64>,
    pub lsh_bands: Vec<u64>,
    pub first_token: Option<String>,
    pub last_token: Option<String>,
}

impl SequenceFeatures {
    pub fn derive(events: &[Event], hasher: &MinHasher, bands: usize, rows: usize) -> Self {
        let length = events.iter().map(|e| e.len()).sum();
        let token_set: BTreeSet<String> = events.iter().flatten().cloned().collect();
        let token_set: Vec<String> = token_set.into_iter().collect();
        let signature = hasher.signature(token_set.iter());
        let band_hashes = lsh_bands(&signature, bands, rows);
        let first_token = events.first().and_then(|e| e.first()).cloned();
        let last_token = events.last().and_then(|e| e.last()).cloned();
        Self {
            length,
            token_count: token_set.len(),
            token_set,
            minhash_sig: signature,
            lsh_bands: band_hashes,
            first_token,
            last_token,
        }
    }
}

/// Exact Jaccard similarity of two sorted distinct-token slices
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let mut i = 0;
    let mut j = 0;
    let mut intersection = 0usize;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                intersection += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Overlap count of two sorted distinct-token slices
pub fn overlap(a: &[String], b: &[String]) -> usize {
    let mut i = 0;
    let mut j = 0;
    let mut count = 0usize;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}
