use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::scoring::SessionResult;

/// Session state machine.
///
/// State transitions:
/// - NotStarted -> TurnActive(0) (start)
/// - TurnActive(i) -> AwaitingAdvance(i) (playback completed; recording keeps running)
/// - AwaitingAdvance(i) -> TurnActive(i+1) (advance, after capture i finalizes)
/// - AwaitingAdvance(i) -> Retrying(i) -> TurnActive(i) (retry discards turn i's recording)
/// - AwaitingAdvance(last) -> Finishing -> Finished (advance/finish on the last turn)
/// - Finishing -> AwaitingAdvance(last) (NoRecordings or transcription failure)
/// - any -> Cancelled (explicit cancel; idempotent teardown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "turn", rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    TurnActive(usize),
    AwaitingAdvance(usize),
    Retrying(usize),
    Finishing,
    Finished,
    Cancelled,
}

impl SessionState {
    /// Whether the session has ended and accepts no further commands.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Cancelled)
    }

    /// Turn index currently in play, if any.
    #[must_use]
    pub fn turn_index(&self) -> Option<usize> {
        match self {
            SessionState::TurnActive(i)
            | SessionState::AwaitingAdvance(i)
            | SessionState::Retrying(i) => Some(*i),
            _ => None,
        }
    }

    /// Check if the session can be started from this state.
    #[must_use]
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::NotStarted)
    }

    /// Check if advance/retry/finish are accepted from this state.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        matches!(self, SessionState::AwaitingAdvance(_))
    }
}

/// Turn-by-turn notifications delivered to the session consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Turn `index` entered its record/playback choreography.
    TurnStarted { index: usize, turn_id: i64 },
    /// Turn `index`'s reference audio reached its natural end.
    PlaybackCompleted { index: usize },
    /// Turn `index`'s recording was stopped and finalized.
    RecordingStopped { index: usize, samples: usize },
    /// The session finished and produced a result.
    SessionFinished { result: SessionResult },
    /// A session-level failure was surfaced to the consumer.
    SessionFailed { reason: String },
}

/// Session-level timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between capture stability and playback start, so the capture
    /// device has a clean pre-roll before the reference voice begins.
    /// Immediate playback right after device acquisition frequently clips
    /// the opening syllable.
    pub pre_roll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { pre_roll_ms: 1_000 }
    }
}

impl SessionConfig {
    pub fn pre_roll(&self) -> Duration {
        Duration::from_millis(self.pre_roll_ms)
    }
}
