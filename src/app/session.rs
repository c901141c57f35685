use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::time;
use tracing::{debug, info, warn};

use crate::app::capture::CaptureController;
use crate::app::playback::PlaybackController;
use crate::domain::scoring::score_session;
use crate::domain::{
    CaptureConfig, CaptureState, DomainError, EngineConfig, Exercise, Recording, SessionConfig,
    SessionEvent, SessionResult, SessionState,
};
use crate::ports::{BatchItem, CaptureDevice, PlaybackSink, ReferenceAudio, Transcriber};

struct Inner {
    state: SessionState,
    /// One slot per turn index; a retried turn's slot is emptied first.
    recordings: Vec<Option<Recording>>,
    capture: Option<CaptureController>,
    playback: Option<PlaybackController>,
}

/// The top-level session state machine.
///
/// Owns one capture and one playback controller per active turn, sequences
/// turns, and on finish hands the recordings to the transcription
/// collaborator and scores the results. Constructed per session and torn
/// down with [`SessionController::cancel`]; there is no shared global
/// state, so independent sessions can run side by side.
///
/// Commands (`start`, `advance`, `retry`, `finish`, `cancel`) serialize on
/// an internal lock; `cancel` pre-empts whichever command is in flight
/// through a teardown signal, so it never waits on a running turn.
pub struct SessionController {
    exercise: Exercise,
    capture_cfg: CaptureConfig,
    session_cfg: SessionConfig,
    device: Arc<dyn CaptureDevice>,
    sink: Arc<dyn PlaybackSink>,
    reference: Arc<dyn ReferenceAudio>,
    transcriber: Arc<dyn Transcriber>,
    events: broadcast::Sender<SessionEvent>,
    cancel_tx: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(
        exercise: Exercise,
        config: &EngineConfig,
        device: Arc<dyn CaptureDevice>,
        sink: Arc<dyn PlaybackSink>,
        reference: Arc<dyn ReferenceAudio>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (cancel_tx, _) = watch::channel(false);
        let recordings = (0..exercise.turns.len()).map(|_| None).collect();

        Self {
            exercise,
            capture_cfg: config.capture.clone(),
            session_cfg: config.session.clone(),
            device,
            sink,
            reference,
            transcriber,
            events,
            cancel_tx,
            inner: Mutex::new(Inner {
                state: SessionState::NotStarted,
                recordings,
                capture: None,
                playback: None,
            }),
        }
    }

    /// Subscribe to turn-by-turn state notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// State of the currently active capture attempt, if any.
    pub async fn capture_state(&self) -> Option<CaptureState> {
        self.inner.lock().await.capture.as_ref().map(|c| c.state())
    }

    /// Start the session: one warm-up cycle, then turn 0's choreography.
    pub async fn start(&self) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.can_start() {
            return Err(DomainError::InvalidSessionState {
                command: "start",
                state: inner.state,
            });
        }
        if self.exercise.turns.is_empty() {
            return Err(DomainError::Config("exercise has no turns".to_string()));
        }

        info!(
            exercise_id = self.exercise.id,
            turns = self.exercise.total_turns(),
            "Session starting"
        );

        // Once per session, not per turn.
        self.guarded(CaptureController::warm_up(&self.device, &self.capture_cfg))
            .await?;

        self.begin_turn(&mut inner, 0).await
    }

    /// Stop the active recording and move on: next turn, or Finishing when
    /// the current turn is the last one.
    pub async fn advance(&self) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let index = match inner.state {
            SessionState::AwaitingAdvance(i) => i,
            state => {
                return Err(DomainError::InvalidSessionState {
                    command: "advance",
                    state,
                })
            }
        };

        // The capture must fully stop and finalize before the next turn's
        // acquisition; only one capture may be active at a time.
        self.stop_capture_into(&mut inner, index).await;

        if index + 1 < self.exercise.turns.len() {
            self.begin_turn(&mut inner, index + 1).await
        } else {
            self.finish_locked(&mut inner, index).await.map(|_| ())
        }
    }

    /// Discard the current turn's recording and run the turn again.
    pub async fn retry(&self) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let index = match inner.state {
            SessionState::AwaitingAdvance(i) => i,
            state => {
                return Err(DomainError::InvalidSessionState {
                    command: "retry",
                    state,
                })
            }
        };

        inner.state = SessionState::Retrying(index);
        if let Some(capture) = inner.capture.take() {
            let _ = capture.stop().await;
        }
        inner.recordings[index] = None;
        debug!(index, "Retrying turn");

        self.begin_turn(&mut inner, index).await
    }

    /// Finish the session: transcribe every recording in turn order and
    /// score the result.
    ///
    /// Accepted from AwaitingAdvance of the last turn, including after a
    /// failed finish; a transcription failure preserves the recordings so
    /// finishing can be retried without re-recording.
    pub async fn finish(&self) -> Result<SessionResult, DomainError> {
        let mut inner = self.inner.lock().await;
        let last = match self.exercise.turns.len().checked_sub(1) {
            Some(last) => last,
            None => {
                return Err(DomainError::InvalidSessionState {
                    command: "finish",
                    state: inner.state,
                })
            }
        };
        match inner.state {
            SessionState::AwaitingAdvance(i) if i == last => {}
            state => {
                return Err(DomainError::InvalidSessionState {
                    command: "finish",
                    state,
                })
            }
        }
        self.finish_locked(&mut inner, last).await
    }

    /// Tear the session down: stop any active capture and playback and
    /// discard all session state. Idempotent; safe to call at any point,
    /// including while another command is in flight.
    pub async fn cancel(&self) {
        let _ = self.cancel_tx.send(true);

        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Cancelled {
            return;
        }
        if let Some(playback) = inner.playback.take() {
            playback.cancel();
        }
        if let Some(capture) = inner.capture.take() {
            let _ = capture.stop().await;
        }
        for slot in inner.recordings.iter_mut() {
            *slot = None;
        }
        inner.state = SessionState::Cancelled;
        info!(exercise_id = self.exercise.id, "Session cancelled");
    }

    /// Turn-start choreography. Capture always precedes playback, with a
    /// stability wait and a fixed pre-roll in between so the reference
    /// voice never starts against a microphone that is not yet delivering.
    async fn begin_turn(&self, inner: &mut Inner, index: usize) -> Result<(), DomainError> {
        let turn = &self.exercise.turns[index];
        inner.state = SessionState::TurnActive(index);
        self.emit(SessionEvent::TurnStarted {
            index,
            turn_id: turn.id,
        });

        // 1. Start capture.
        let capture = match self
            .guarded(CaptureController::start(
                Arc::clone(&self.device),
                turn.id,
                self.capture_cfg.clone(),
            ))
            .await?
        {
            Ok(capture) => capture,
            Err(e) => {
                // DeviceDenied is fatal for the session and never retried
                // automatically; the session ends only via cancel.
                self.emit(SessionEvent::SessionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        inner.capture = Some(capture.clone());

        // 2. Block until the microphone is demonstrably capturing.
        self.guarded(capture.wait_until_stable()).await?;

        // 3. Fixed pre-roll; immediate playback right after acquisition
        //    clips the opening syllable.
        self.guarded(time::sleep(self.session_cfg.pre_roll()))
            .await?;

        // 4. Start the turn's reference audio.
        let playback = match self
            .guarded(PlaybackController::start(
                &self.sink,
                &self.reference,
                self.exercise.id,
                turn.id,
            ))
            .await?
        {
            Ok(playback) => playback,
            Err(e) => {
                warn!(index, error = %e, "Reference playback failed; turn can be retried");
                let _ = capture.stop().await;
                inner.capture = None;
                inner.recordings[index] = None;
                inner.state = SessionState::AwaitingAdvance(index);
                return Err(e);
            }
        };
        inner.playback = Some(playback.clone());

        // 5. Await natural completion. The recording keeps running; the
        //    learner speaks until they advance or the ceiling elapses.
        match self.guarded(playback.completed()).await? {
            Ok(()) => {
                inner.playback = None;
                inner.state = SessionState::AwaitingAdvance(index);
                self.emit(SessionEvent::PlaybackCompleted { index });
                Ok(())
            }
            Err(e) => {
                warn!(index, error = %e, "Playback failed mid-turn; turn can be retried");
                playback.cancel();
                inner.playback = None;
                let _ = capture.stop().await;
                inner.capture = None;
                inner.recordings[index] = None;
                inner.state = SessionState::AwaitingAdvance(index);
                Err(e)
            }
        }
    }

    async fn finish_locked(
        &self,
        inner: &mut Inner,
        last_index: usize,
    ) -> Result<SessionResult, DomainError> {
        self.stop_capture_into(inner, last_index).await;
        inner.state = SessionState::Finishing;

        let has_audio = inner
            .recordings
            .iter()
            .flatten()
            .any(|r| !r.audio.is_empty());
        if !has_audio {
            inner.state = SessionState::AwaitingAdvance(last_index);
            self.emit(SessionEvent::SessionFailed {
                reason: DomainError::NoRecordings.to_string(),
            });
            return Err(DomainError::NoRecordings);
        }

        let batch_outcome = {
            let items: Vec<BatchItem<'_>> = inner
                .recordings
                .iter()
                .flatten()
                .map(|r| BatchItem {
                    turn_id: r.turn_id,
                    audio: &r.audio,
                })
                .collect();
            info!(recordings = items.len(), "Transcribing session batch");
            self.guarded(self.transcriber.transcribe_batch(&items))
                .await
        };

        let transcripts = match batch_outcome? {
            Ok(transcripts) => transcripts,
            Err(e) => {
                // Keep the recordings: finishing can be retried without
                // re-recording anything.
                inner.state = SessionState::AwaitingAdvance(last_index);
                self.emit(SessionEvent::SessionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut by_turn: HashMap<i64, String> = transcripts
            .into_iter()
            .map(|t| (t.turn_id, t.text))
            .collect();
        let ordered: Vec<String> = self
            .exercise
            .turns
            .iter()
            .map(|turn| by_turn.remove(&turn.id).unwrap_or_default())
            .collect();

        let result = score_session(&self.exercise.turns, &ordered);

        // Ownership of the raw audio ends at the transcription hand-off;
        // the buffers are zeroed as they drop.
        for slot in inner.recordings.iter_mut() {
            *slot = None;
        }

        inner.state = SessionState::Finished;
        info!(
            exercise_id = self.exercise.id,
            total_score = result.total_score,
            "Session finished"
        );
        self.emit(SessionEvent::SessionFinished {
            result: result.clone(),
        });

        Ok(result)
    }

    /// Stop and collect the active capture, if any. Not guarded by the
    /// teardown signal: stop always resolves and must run during teardown.
    async fn stop_capture_into(&self, inner: &mut Inner, index: usize) {
        if let Some(capture) = inner.capture.take() {
            if let Some(recording) = capture.stop().await {
                let samples = recording.audio.len();
                self.emit(SessionEvent::RecordingStopped { index, samples });
                inner.recordings[index] = Some(recording);
            }
        }
    }

    /// Run a suspension point under the session teardown signal.
    async fn guarded<F, T>(&self, fut: F) -> Result<T, DomainError>
    where
        F: Future<Output = T>,
    {
        let mut cancel_rx = self.cancel_tx.subscribe();
        tokio::select! {
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => Err(DomainError::Cancelled),
            value = fut => Ok(value),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
