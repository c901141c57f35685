use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::domain::{AudioClip, DomainError};
use crate::ports::{PlaybackHandle, PlaybackProgress, PlaybackSink};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// rodio-based playback sink.
///
/// Each `start` spawns a dedicated thread owning the non-Send OutputStream
/// and Sink; progress flows back over a watch channel, and a shared stop
/// flag tears playback down without emitting a completion notification.
pub struct RodioPlaybackSink {
    volume: f32,
}

impl RodioPlaybackSink {
    pub fn new() -> Self {
        Self { volume: 1.0 }
    }

    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

impl Default for RodioPlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackSink for RodioPlaybackSink {
    async fn start(&self, clip: AudioClip) -> Result<Box<dyn PlaybackHandle>, DomainError> {
        let (progress_tx, progress_rx) = watch::channel(PlaybackProgress::Playing);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        let volume = self.volume;
        thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || playback_thread_main(clip, volume, progress_tx, ready_tx, stop_flag))
            .map_err(|e| DomainError::PlaybackFailed {
                message: format!("Failed to spawn playback thread: {}", e),
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Box::new(RodioPlaybackHandle {
                progress: progress_rx,
                stop,
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DomainError::PlaybackFailed {
                message: "Playback thread did not respond".to_string(),
            }),
        }
    }
}

/// Playback thread runner - the rodio OutputStream is created and kept
/// here because it is not Send.
fn playback_thread_main(
    clip: AudioClip,
    volume: f32,
    progress_tx: watch::Sender<PlaybackProgress>,
    ready_tx: oneshot::Sender<Result<(), DomainError>>,
    stop: Arc<AtomicBool>,
) {
    let setup = (|| -> Result<(OutputStream, Sink), DomainError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| DomainError::PlaybackFailed {
                message: format!("Failed to open output device: {}", e),
            })?;

        let sink = Sink::try_new(&stream_handle).map_err(|e| DomainError::PlaybackFailed {
            message: format!("Failed to create audio sink: {}", e),
        })?;
        sink.set_volume(volume);

        let source = Decoder::new(Cursor::new(clip.data)).map_err(|e| {
            DomainError::PlaybackFailed {
                message: format!("Failed to decode audio: {}", e),
            }
        })?;
        sink.append(source);

        Ok((stream, sink))
    })();

    let (_stream, sink) = match setup {
        Ok(pair) => {
            let _ = ready_tx.send(Ok(()));
            pair
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    info!("Reference audio playing");

    // sleep_until_end cannot observe the stop flag, so poll instead.
    loop {
        if stop.load(Ordering::Acquire) {
            sink.stop();
            debug!("Playback stopped before completion");
            return;
        }
        if sink.empty() {
            let _ = progress_tx.send(PlaybackProgress::Completed);
            debug!("Playback completed");
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

struct RodioPlaybackHandle {
    progress: watch::Receiver<PlaybackProgress>,
    stop: Arc<AtomicBool>,
}

impl PlaybackHandle for RodioPlaybackHandle {
    fn progress(&self) -> watch::Receiver<PlaybackProgress> {
        self.progress.clone()
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}
