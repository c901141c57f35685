use serde::{Deserialize, Serialize};

/// One contiguous chunk of an exercise's reference text, practiced and
/// scored independently. Turn ids are unique within an exercise and the
/// sequence order is fixed for the exercise's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique id within the exercise; ordering follows sequence position.
    pub id: i64,
    /// Reference sentence or clause the learner shadows.
    pub text: String,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
}

impl Turn {
    /// Create a turn, deriving the word count from the text.
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            id,
            text,
            word_count,
        }
    }
}

/// An exercise: a titled sequence of turns. Exercise storage and turn
/// splitting belong to external collaborators; the engine only reads this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub title: String,
    pub turns: Vec<Turn>,
}

impl Exercise {
    pub fn new(id: i64, title: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            id,
            title: title.into(),
            turns,
        }
    }

    /// Number of turns in the exercise.
    pub fn total_turns(&self) -> usize {
        self.turns.len()
    }
}
