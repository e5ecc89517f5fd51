//! Deterministic content hashing
//!
//! Every identity in the engine (pattern names, vector symbols, STM cache
//! keys, MinHash token values) derives from SHA-1 so that results are stable
//! across runs, processes, and machines. SHA-1 is an identity scheme here, not
//! a security boundary.

use sha1::{Digest, Sha1};

/// Lowercase 40-hex SHA-1 of the input bytes
pub fn sha1_hex(bytes: &[u8]) -> String {
    let digest = Sha1::digest(bytes);
    let mut out = String::with_capacity(40);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Stable u64 for a symbol: first 8 bytes of its SHA-1, big-endian
pub fn token_u64(token: &str) -> u64 {
    let digest = Sha1::digest(token.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().unwrap_or([0u8; 8]))
}

/// SplitMix64 step, used to derive fixed MinHash permutation parameters
pub fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
