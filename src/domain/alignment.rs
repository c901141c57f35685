use std::collections::BTreeSet;

use crate::domain::text::Token;

/// Result of aligning a recognized token sequence against the original.
///
/// Holds the indices into the original sequence that belong to a longest
/// common subsequence with the recognized sequence. Produced fresh on each
/// scoring call and never persisted; callers persist only the derived score
/// and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    matched_original: BTreeSet<usize>,
}

impl Alignment {
    /// Indices of original tokens that were found in the recognized text.
    pub fn matched_original_indices(&self) -> &BTreeSet<usize> {
        &self.matched_original
    }

    /// Whether the original token at `index` participates in the alignment.
    #[must_use]
    pub fn is_matched(&self, index: usize) -> bool {
        self.matched_original.contains(&index)
    }

    /// Number of matched original tokens, i.e. the LCS length.
    pub fn len(&self) -> usize {
        self.matched_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched_original.is_empty()
    }
}

/// Compute the longest common subsequence of `original` and `recognized`
/// under [`Token::matches`] and return the matched original-index set.
///
/// Quadratic dynamic program over the full (m+1)x(n+1) count table. The
/// backtrack is deterministic: walking from (m, n), ties between the two
/// axes resolve by stepping back on the original axis, so a recognized-side
/// token is treated as inserted rather than an original-side token as
/// deleted. Downstream display and scoring rely on this exact index set.
pub fn align(original: &[Token], recognized: &[Token]) -> Alignment {
    let m = original.len();
    let n = recognized.len();

    let mut matched_original = BTreeSet::new();
    if m == 0 || n == 0 {
        return Alignment { matched_original };
    }

    // dp[i][j] = LCS length of original[..i] and recognized[..j].
    let mut dp = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if original[i - 1].matches(&recognized[j - 1]) {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if original[i - 1].matches(&recognized[j - 1]) && dp[i][j] == dp[i - 1][j - 1] + 1 {
            matched_original.insert(i - 1);
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] >= dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    Alignment { matched_original }
}
