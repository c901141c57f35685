use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{AudioClip, DomainError};

/// Progress of one playback attempt, published over a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackProgress {
    Playing,
    /// Natural end of the clip.
    Completed,
    /// The clip could not be decoded or the output device failed.
    Failed(String),
}

/// Port for playing reference audio clips.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Start playing an encoded clip.
    ///
    /// Resolves once playback has actually begun; load/decode errors are
    /// returned as [`DomainError::PlaybackFailed`].
    async fn start(&self, clip: AudioClip) -> Result<Box<dyn PlaybackHandle>, DomainError>;
}

/// Handle to a single in-flight playback.
pub trait PlaybackHandle: Send + Sync {
    /// Watch channel that moves from Playing to Completed or Failed
    /// exactly once.
    fn progress(&self) -> watch::Receiver<PlaybackProgress>;

    /// Stop playback immediately. Idempotent; suppressing the resulting
    /// notifications is the caller's concern.
    fn stop(&self);
}
