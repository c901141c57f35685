use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AudioBuffer, DomainError};

/// One recording queued for transcription, borrowed from the session.
///
/// Borrowing keeps buffer ownership with the session so a failed batch call
/// leaves the recordings intact and finishing can be retried without
/// re-recording.
#[derive(Debug)]
pub struct BatchItem<'a> {
    pub turn_id: i64,
    pub audio: &'a AudioBuffer,
}

/// Recognized text for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTranscript {
    pub turn_id: i64,
    pub text: String,
}

/// Port for speech-to-text transcription.
///
/// Called once per finished session with all turn recordings in turn order.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a batch of recordings.
    ///
    /// Failures map to [`DomainError::Transcription`] and must leave the
    /// borrowed buffers untouched.
    async fn transcribe_batch(
        &self,
        items: &[BatchItem<'_>],
    ) -> Result<Vec<TurnTranscript>, DomainError>;
}
