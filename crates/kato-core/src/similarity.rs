//! Sequence similarity
//!
//! The ranking score between an observed STM and a pattern is the
//! LCS-based ratio `2 * matches / (len_obs + len_pat)` over the flattened
//! symbol sequences. The alignment also yields the matched index pairs (for
//! the `matches` field and fragmentation) without a second pass.

/// Result of one LCS alignment
#[derive(Debug, Clone)]
pub struct LcsAlignment {
    /// Matched (observed index, pattern index) pairs, ascending in both
    pub pairs: Vec<(usize, usize)>,
    /// Number of matched symbols
    pub matches: usize,
    /// `2 * matches / (len_obs + len_pat)`; 0 when both sides are empty
    pub similarity: f64,
}

/// Optimal LCS alignment of two symbol sequences.
///
/// Backtracking is deterministic: diagonal on equality, otherwise the upper
/// cell on ties, so identical inputs always produce identical pairs.
pub fn align(observed: &[String], pattern: &[String]) -> LcsAlignment {
    let m = observed.len();
    let n = pattern.len();
    if m == 0 || n == 0 {
        return LcsAlignment {
            pairs: Vec::new(),
            matches: 0,
            similarity: 0.0,
        };
    }

    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if observed[i - 1] == pattern[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[m][n]);
    let mut i = m;
    let mut j = n;
    while i > 0 && j > 0 {
        if observed[i - 1] == pattern[j - 1] {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    pairs.reverse();

    let matches = pairs.len();
    LcsAlignment {
        matches,
        similarity: 2.0 * matches as f64 / (m + n) as f64,
        pairs,
    }
}

/// Alignment with a score cutoff.
///
/// The cutoff is a heuristic filter: an upper bound
/// (`2 * min(m, n) / (m + n)`) short-circuits hopeless candidates before the
/// quadratic pass, and the exact score is compared after. Returns `None` for
/// candidates below the cutoff.
pub fn align_with_cutoff(
    observed: &[String],
    pattern: &[String],
    cutoff: f64,
) -> Option<LcsAlignment> {
    let m = observed.len();
    let n = pattern.len();
    if m + n > 0 {
        let upper_bound = 2.0 * m.min(n) as f64 / (m + n) as f64;
        if upper_bound < cutoff {
            return None;
        }
    }
    let alignment = align(observed, pattern);
    if alignment.similarity >= cutoff {
        Some(alignment)
    } else {
        None
    }
}

/// Number of contiguous matched blocks: runs of pairs advancing by one on
/// both sides. A perfectly contiguous match is one block.
pub fn contiguous_runs(pairs: &[(usize, usize)]) -> usize {
    if pairs.is_empty() {
        return 0;
    }
    let mut runs = 1;
    for window in pairs.windows(2) {
        let (prev_i, prev_j) = window[0];
        let (next_i, next_j) = window[1];
        if next_i != prev_i + 1 || next_j != prev_j + 1 {
            runs += 1;
        }
    }
    runs
}
