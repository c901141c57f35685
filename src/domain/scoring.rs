use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::alignment::align;
use crate::domain::exercise::Turn;
use crate::domain::text::tokenize;

/// Per-turn comparison of the reference text with the recognized transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub turn_id: i64,
    /// Reference text of the turn.
    pub original: String,
    /// Recognized transcript (empty when the turn produced no speech).
    pub recognized: String,
    /// Indices of original tokens that are alphabetic words and were found
    /// in the recognized text. Word tokens outside this set are mismatches;
    /// punctuation tokens are never mismatches.
    pub matched_word_indices: BTreeSet<usize>,
    /// Match ratio in [0, 100].
    pub score: f64,
}

/// Aggregate result of one complete session pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Arithmetic mean of the turn scores, in [0, 100]. Unrounded.
    pub total_score: f64,
    /// Turn results in turn sequence order.
    pub turn_results: Vec<TurnResult>,
}

impl SessionResult {
    /// Total score rounded to one decimal for presentation.
    /// Scores are never rounded internally.
    #[must_use]
    pub fn total_score_display(&self) -> f64 {
        (self.total_score * 10.0).round() / 10.0
    }
}

/// Score one turn against its recognized transcript.
///
/// Tokenizes both texts, aligns them, and scores the ratio of matched
/// alphabetic word tokens over the original's alphabetic word tokens. The
/// formula is intentionally asymmetric: words the speaker inserted never
/// reduce the score, only omitted or substituted original words do. Mismatch
/// highlighting derives from the same alignment, so score and highlight can
/// never disagree.
pub fn score_turn(turn: &Turn, recognized: &str) -> TurnResult {
    let original_tokens = tokenize(&turn.text);
    let recognized_tokens = tokenize(recognized);
    let alignment = align(&original_tokens, &recognized_tokens);

    let mut matched_word_indices = BTreeSet::new();
    let mut word_total = 0usize;
    for token in &original_tokens {
        if !token.is_alphabetic_word() {
            continue;
        }
        word_total += 1;
        if alignment.is_matched(token.position) {
            matched_word_indices.insert(token.position);
        }
    }

    // Zero words should not occur given upstream word-count validation on
    // exercise creation, but an empty original must not divide by zero.
    let score = if word_total == 0 {
        0.0
    } else {
        100.0 * matched_word_indices.len() as f64 / word_total as f64
    };

    TurnResult {
        turn_id: turn.id,
        original: turn.text.clone(),
        recognized: recognized.to_string(),
        matched_word_indices,
        score,
    }
}

/// Score a whole session: one transcript per turn, in turn sequence order.
///
/// A turn with no recognized text scores 0 and still counts toward the mean.
pub fn score_session(turns: &[Turn], transcripts: &[String]) -> SessionResult {
    let turn_results: Vec<TurnResult> = turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let recognized = transcripts.get(i).map(String::as_str).unwrap_or("");
            score_turn(turn, recognized)
        })
        .collect();

    let total_score = if turn_results.is_empty() {
        0.0
    } else {
        turn_results.iter().map(|r| r.score).sum::<f64>() / turn_results.len() as f64
    };

    SessionResult {
        total_score,
        turn_results,
    }
}
