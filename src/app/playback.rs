use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{AtomicPlaybackState, DomainError, PlaybackState};
use crate::ports::{PlaybackHandle, PlaybackProgress, PlaybackSink, ReferenceAudio};

/// Owns the lifecycle of one turn's reference audio: load, play, completion
/// notification and cancellation.
///
/// Completion fires at most once per instance; cancelling transitions to
/// Idle and suppresses any pending completion or failure notification.
#[derive(Clone)]
pub struct PlaybackController {
    state: Arc<AtomicPlaybackState>,
    handle: Arc<dyn PlaybackHandle>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController").finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// Fetch the turn's clip through the reference port and start playing.
    ///
    /// Load and decode failures are recoverable at turn granularity and
    /// surface as [`DomainError::PlaybackFailed`].
    pub async fn start(
        sink: &Arc<dyn PlaybackSink>,
        reference: &Arc<dyn ReferenceAudio>,
        exercise_id: i64,
        turn_id: i64,
    ) -> Result<Self, DomainError> {
        let state = Arc::new(AtomicPlaybackState::new(PlaybackState::Loading));

        let clip = reference
            .turn_audio(exercise_id, turn_id)
            .await
            .map_err(|e| DomainError::PlaybackFailed {
                message: e.to_string(),
            })?;

        let handle = sink.start(clip).await?;
        state.store(PlaybackState::Playing);
        info!(exercise_id, turn_id, "Reference playback started");

        Ok(Self {
            state,
            handle: Arc::from(handle),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resolve when playback reaches its natural end.
    pub async fn completed(&self) -> Result<(), DomainError> {
        let mut rx = self.handle.progress();
        loop {
            let progress = rx.borrow_and_update().clone();
            match progress {
                PlaybackProgress::Playing => {}
                PlaybackProgress::Completed => {
                    self.state.store(PlaybackState::Completed);
                    return Ok(());
                }
                PlaybackProgress::Failed(message) => {
                    self.state.store(PlaybackState::Failed);
                    return Err(DomainError::PlaybackFailed { message });
                }
            }
            if rx.changed().await.is_err() {
                self.state.store(PlaybackState::Failed);
                return Err(DomainError::PlaybackFailed {
                    message: "playback ended unexpectedly".to_string(),
                });
            }
        }
    }

    /// Stop playback and return to Idle, suppressing any pending
    /// notification from this instance. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.handle.stop();
            self.state.store(PlaybackState::Idle);
            debug!("Playback cancelled");
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AudioClip;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time;

    struct FakeSink {
        duration: Duration,
    }

    struct FakeHandle {
        rx: watch::Receiver<PlaybackProgress>,
        stopped: Arc<AtomicBool>,
    }

    impl PlaybackHandle for FakeHandle {
        fn progress(&self) -> watch::Receiver<PlaybackProgress> {
            self.rx.clone()
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PlaybackSink for FakeSink {
        async fn start(&self, _clip: AudioClip) -> Result<Box<dyn PlaybackHandle>, DomainError> {
            let (tx, rx) = watch::channel(PlaybackProgress::Playing);
            let stopped = Arc::new(AtomicBool::new(false));
            let duration = self.duration;
            let stop_flag = Arc::clone(&stopped);
            tokio::spawn(async move {
                time::sleep(duration).await;
                if !stop_flag.load(Ordering::SeqCst) {
                    let _ = tx.send(PlaybackProgress::Completed);
                }
            });
            Ok(Box::new(FakeHandle { rx, stopped }))
        }
    }

    struct FakeReference;

    #[async_trait]
    impl ReferenceAudio for FakeReference {
        async fn turn_audio(
            &self,
            _exercise_id: i64,
            _turn_id: i64,
        ) -> Result<AudioClip, DomainError> {
            Ok(AudioClip::new(vec![0u8; 4]))
        }

        async fn full_audio(&self, exercise_id: i64) -> Result<AudioClip, DomainError> {
            Err(DomainError::AudioNotFound {
                exercise_id,
                turn_id: None,
            })
        }
    }

    struct MissingReference;

    #[async_trait]
    impl ReferenceAudio for MissingReference {
        async fn turn_audio(
            &self,
            exercise_id: i64,
            turn_id: i64,
        ) -> Result<AudioClip, DomainError> {
            Err(DomainError::AudioNotFound {
                exercise_id,
                turn_id: Some(turn_id),
            })
        }

        async fn full_audio(&self, exercise_id: i64) -> Result<AudioClip, DomainError> {
            Err(DomainError::AudioNotFound {
                exercise_id,
                turn_id: None,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_runs_to_completion() {
        let sink: Arc<dyn PlaybackSink> = Arc::new(FakeSink {
            duration: Duration::from_secs(2),
        });
        let reference: Arc<dyn ReferenceAudio> = Arc::new(FakeReference);

        let playback = PlaybackController::start(&sink, &reference, 1, 1)
            .await
            .unwrap();
        assert_eq!(playback.state(), PlaybackState::Playing);

        playback.completed().await.unwrap();
        assert_eq!(playback.state(), PlaybackState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_clip_is_playback_failure() {
        let sink: Arc<dyn PlaybackSink> = Arc::new(FakeSink {
            duration: Duration::from_secs(2),
        });
        let reference: Arc<dyn ReferenceAudio> = Arc::new(MissingReference);

        let err = PlaybackController::start(&sink, &reference, 1, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PlaybackFailed { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_goes_idle() {
        let sink: Arc<dyn PlaybackSink> = Arc::new(FakeSink {
            duration: Duration::from_secs(2),
        });
        let reference: Arc<dyn ReferenceAudio> = Arc::new(FakeReference);

        let playback = PlaybackController::start(&sink, &reference, 1, 1)
            .await
            .unwrap();
        playback.cancel();
        playback.cancel();
        assert_eq!(playback.state(), PlaybackState::Idle);
    }
}
