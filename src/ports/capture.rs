use async_trait::async_trait;

use crate::domain::{AudioChunk, DomainError};

/// Port for acquiring the audio input device.
///
/// Implementations own the platform capture pipeline. The engine's capture
/// controller owns the lifecycle: it opens a stream per recording attempt
/// and always closes it before the next acquisition, since repeated
/// acquisition without release is the primary source of stuck-microphone
/// states.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the input device and start delivering chunks.
    ///
    /// Fails with [`DomainError::DeviceDenied`] when permission is refused
    /// or no input device exists. Never retried automatically.
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError>;
}

/// An open capture stream delivering timestamped sample chunks.
#[async_trait]
pub trait CaptureStream: Send {
    /// Receive the next chunk. Returns None once the stream has ended.
    async fn next_chunk(&mut self) -> Option<AudioChunk>;

    /// Stop capture and release the device. Idempotent; must always
    /// resolve even if no data was ever captured.
    async fn close(&mut self);
}
