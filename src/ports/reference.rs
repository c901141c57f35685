use async_trait::async_trait;

use crate::domain::{AudioClip, DomainError};

/// Port for retrieving pre-generated reference audio.
///
/// Speech generation itself is an external concern; the engine only
/// addresses finished clips by (exercise, turn).
#[async_trait]
pub trait ReferenceAudio: Send + Sync {
    /// Fetch the clip for one turn.
    ///
    /// Fails with [`DomainError::AudioNotFound`] when no clip exists.
    async fn turn_audio(&self, exercise_id: i64, turn_id: i64) -> Result<AudioClip, DomainError>;

    /// Fetch the whole-exercise clip used by listening mode.
    async fn full_audio(&self, exercise_id: i64) -> Result<AudioClip, DomainError>;
}
