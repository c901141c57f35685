//! End-to-end session choreography tests against in-memory ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use openshadow::domain::{
    AudioChunk, AudioClip, CaptureState, DomainError, EngineConfig, Exercise, SessionEvent,
    SessionState, Turn,
};
use openshadow::ports::{
    BatchItem, CaptureDevice, CaptureStream, PlaybackHandle, PlaybackProgress, PlaybackSink,
    ReferenceAudio, ResultStore, SavedResult, Transcriber, TurnTranscript,
};
use openshadow::SessionController;

const CHUNK_INTERVAL: Duration = Duration::from_millis(10);

struct MockDevice {
    silent: AtomicBool,
    opens: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    open_times: Mutex<Vec<Instant>>,
}

impl MockDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            silent: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            open_times: Mutex::new(Vec::new()),
        })
    }

    fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }
}

#[async_trait]
impl CaptureDevice for MockDevice {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.open_times.lock().push(Instant::now());

        Ok(Box::new(MockStream {
            silent: self.silent.load(Ordering::SeqCst),
            active: Arc::clone(&self.active),
            closed: false,
        }))
    }
}

struct MockStream {
    silent: bool,
    active: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl CaptureStream for MockStream {
    async fn next_chunk(&mut self) -> Option<AudioChunk> {
        if self.closed {
            return None;
        }
        time::sleep(CHUNK_INTERVAL).await;
        if self.silent {
            Some(AudioChunk::new(Vec::new()))
        } else {
            Some(AudioChunk::new(vec![1i16; 160]))
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct MockSink {
    duration: Duration,
    starts: Mutex<Vec<Instant>>,
}

impl MockSink {
    fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            starts: Mutex::new(Vec::new()),
        })
    }
}

struct MockHandle {
    rx: watch::Receiver<PlaybackProgress>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for MockHandle {
    fn progress(&self) -> watch::Receiver<PlaybackProgress> {
        self.rx.clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlaybackSink for MockSink {
    async fn start(&self, _clip: AudioClip) -> Result<Box<dyn PlaybackHandle>, DomainError> {
        self.starts.lock().push(Instant::now());

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

        Ok(Box::new(MockHandle { rx, stopped }))
    }
}

struct MockReference;

#[async_trait]
impl ReferenceAudio for MockReference {
    async fn turn_audio(&self, _exercise_id: i64, _turn_id: i64) -> Result<AudioClip, DomainError> {
        Ok(AudioClip::new(vec![0u8; 16]))
    }

    async fn full_audio(&self, exercise_id: i64) -> Result<AudioClip, DomainError> {
        Err(DomainError::AudioNotFound {
            exercise_id,
            turn_id: None,
        })
    }
}

struct ScriptedTranscriber {
    by_turn: HashMap<i64, String>,
    fail_remaining: AtomicUsize,
    calls: AtomicUsize,
    last_batch_len: AtomicUsize,
}

impl ScriptedTranscriber {
    fn new(transcripts: &[(i64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            by_turn: transcripts
                .iter()
                .map(|(id, text)| (*id, text.to_string()))
                .collect(),
            fail_remaining: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            last_batch_len: AtomicUsize::new(0),
        })
    }

    fn fail_next(&self, times: usize) {
        self.fail_remaining.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe_batch(
        &self,
        items: &[BatchItem<'_>],
    ) -> Result<Vec<TurnTranscript>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_batch_len.store(items.len(), Ordering::SeqCst);

        if self.fail_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(DomainError::Transcription(
                "service unavailable".to_string(),
            ));
        }

        Ok(items
            .iter()
            .map(|item| TurnTranscript {
                turn_id: item.turn_id,
                text: self.by_turn.get(&item.turn_id).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

struct MemoryResultStore {
    saved: Mutex<Vec<SavedResult>>,
}

impl MemoryResultStore {
    fn new() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(
        &self,
        exercise_id: i64,
        result: &openshadow::SessionResult,
    ) -> Result<SavedResult, DomainError> {
        let mut saved = self.saved.lock();
        let record = SavedResult {
            id: saved.len() as i64 + 1,
            exercise_id,
            result: result.clone(),
        };
        saved.push(record.clone());
        Ok(record)
    }
}

fn exercise(texts: &[&str]) -> Exercise {
    let turns = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Turn::new(i as i64 + 1, *text))
        .collect();
    Exercise::new(42, "Practice", turns)
}

fn session(
    texts: &[&str],
    device: &Arc<MockDevice>,
    sink: &Arc<MockSink>,
    transcriber: &Arc<ScriptedTranscriber>,
) -> SessionController {
    SessionController::new(
        exercise(texts),
        &EngineConfig::default(),
        Arc::clone(device) as Arc<dyn CaptureDevice>,
        Arc::clone(sink) as Arc<dyn PlaybackSink>,
        Arc::new(MockReference),
        Arc::clone(transcriber) as Arc<dyn Transcriber>,
    )
}

#[tokio::test(start_paused = true)]
async fn full_session_produces_scored_result() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(2));
    let transcriber = ScriptedTranscriber::new(&[(1, "Hello world"), (2, "good")]);
    let session = session(
        &["hello world", "good morning"],
        &device,
        &sink,
        &transcriber,
    );

    session.start().await.unwrap();
    assert_eq!(session.state().await, SessionState::AwaitingAdvance(0));

    session.advance().await.unwrap();
    assert_eq!(session.state().await, SessionState::AwaitingAdvance(1));

    let result = session.finish().await.unwrap();
    assert_eq!(session.state().await, SessionState::Finished);

    // Turn 1: both words matched (case-insensitive). Turn 2: one of two.
    assert_eq!(result.turn_results[0].score, 100.0);
    assert_eq!(result.turn_results[1].score, 50.0);
    assert_eq!(result.total_score, 75.0);
    assert_eq!(result.turn_results[0].recognized, "Hello world");

    // Persisting the result is the consumer's step after SessionFinished.
    let store = MemoryResultStore::new();
    let saved = store.save(session.exercise().id, &result).await.unwrap();
    assert_eq!(saved.exercise_id, 42);
    assert_eq!(saved.result.total_score, 75.0);
    assert_eq!(store.saved.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn playback_waits_for_stability_and_pre_roll() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(2));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = session(&["one"], &device, &sink, &transcriber);

    session.start().await.unwrap();

    // Opens: warm-up first, then turn 0.
    assert_eq!(device.opens.load(Ordering::SeqCst), 2);
    let capture_open = device.open_times.lock()[1];
    let playback_start = sink.starts.lock()[0];

    // First chunk + 300ms settle margin + 1s pre-roll must all elapse
    // before the reference voice starts.
    let config = EngineConfig::default();
    let min_gap = CHUNK_INTERVAL
        + Duration::from_millis(config.capture.settle_margin_ms)
        + config.session.pre_roll();
    assert!(playback_start.duration_since(capture_open) >= min_gap);
}

#[tokio::test(start_paused = true)]
async fn only_one_capture_is_ever_active() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "a"), (2, "b"), (3, "c")]);
    let session = session(&["a", "b", "c"], &device, &sink, &transcriber);

    session.start().await.unwrap();
    session.advance().await.unwrap();
    session.advance().await.unwrap();
    // Advancing past the last turn finishes the session.
    session.advance().await.unwrap();

    assert_eq!(session.state().await, SessionState::Finished);
    assert_eq!(device.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(device.active.load(Ordering::SeqCst), 0);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transcriber.last_batch_len.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn auto_stopped_recording_still_finishes() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(2));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = session(&["one"], &device, &sink, &transcriber);

    session.start().await.unwrap();

    // Leave the learner idle past the recording ceiling.
    time::sleep(Duration::from_secs(25)).await;
    assert_eq!(session.capture_state().await, Some(CaptureState::Finalized));

    // Finish must collect the already-finalized recording without hanging.
    let result = session.finish().await.unwrap();
    assert_eq!(session.state().await, SessionState::Finished);
    assert_eq!(result.turn_results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_turn_tears_the_session_down() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(10));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = Arc::new(session(&["one"], &device, &sink, &transcriber));

    let starter = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.start().await })
    };

    // Let the turn get as far as playback, then pull the plug.
    time::sleep(Duration::from_secs(3)).await;
    session.cancel().await;

    let outcome = starter.await.unwrap();
    assert!(matches!(outcome, Err(DomainError::Cancelled)));
    assert_eq!(session.state().await, SessionState::Cancelled);
    assert_eq!(device.active.load(Ordering::SeqCst), 0);

    // Teardown is idempotent and later commands are rejected.
    session.cancel().await;
    assert_eq!(session.state().await, SessionState::Cancelled);
    assert!(matches!(
        session.advance().await,
        Err(DomainError::InvalidSessionState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn retry_discards_the_previous_take() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = session(&["one"], &device, &sink, &transcriber);

    session.start().await.unwrap();
    session.retry().await.unwrap();
    assert_eq!(session.state().await, SessionState::AwaitingAdvance(0));

    let result = session.finish().await.unwrap();
    assert_eq!(result.turn_results.len(), 1);

    // Warm-up, first take, retried take.
    assert_eq!(device.opens.load(Ordering::SeqCst), 3);
    assert_eq!(transcriber.last_batch_len.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_session_reports_no_recordings_then_recovers() {
    let device = MockDevice::new();
    device.set_silent(true);
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = session(&["one"], &device, &sink, &transcriber);

    session.start().await.unwrap();

    let err = session.finish().await.unwrap_err();
    assert!(matches!(err, DomainError::NoRecordings));
    assert!(err.is_recoverable());
    assert_eq!(session.state().await, SessionState::AwaitingAdvance(0));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);

    // The microphone comes back; the turn is retried and the session
    // completes normally.
    device.set_silent(false);
    session.retry().await.unwrap();
    let result = session.finish().await.unwrap();
    assert_eq!(session.state().await, SessionState::Finished);
    assert_eq!(result.turn_results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transcription_failure_preserves_recordings_for_a_second_finish() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    transcriber.fail_next(1);
    let session = session(&["one"], &device, &sink, &transcriber);

    session.start().await.unwrap();

    let err = session.finish().await.unwrap_err();
    assert!(matches!(err, DomainError::Transcription(_)));
    assert!(err.is_recoverable());
    assert_eq!(session.state().await, SessionState::AwaitingAdvance(0));

    // Second finish re-submits the same recordings; nothing is re-recorded.
    let result = session.finish().await.unwrap();
    assert_eq!(session.state().await, SessionState::Finished);
    assert_eq!(result.turn_results.len(), 1);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
    assert_eq!(transcriber.last_batch_len.load(Ordering::SeqCst), 1);
    assert_eq!(device.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn events_are_broadcast_in_turn_order() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "a"), (2, "b")]);
    let session = session(&["a", "b"], &device, &sink, &transcriber);
    let mut events = session.subscribe();

    session.start().await.unwrap();
    session.advance().await.unwrap();
    session.advance().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(matches!(
        seen[0],
        SessionEvent::TurnStarted { index: 0, turn_id: 1 }
    ));
    assert!(matches!(seen[1], SessionEvent::PlaybackCompleted { index: 0 }));
    assert!(matches!(
        seen[2],
        SessionEvent::RecordingStopped { index: 0, samples } if samples > 0
    ));
    assert!(matches!(
        seen[3],
        SessionEvent::TurnStarted { index: 1, turn_id: 2 }
    ));
    assert!(matches!(seen[4], SessionEvent::PlaybackCompleted { index: 1 }));
    assert!(matches!(
        seen[5],
        SessionEvent::RecordingStopped { index: 1, samples } if samples > 0
    ));
    assert!(matches!(seen[6], SessionEvent::SessionFinished { .. }));
    assert_eq!(seen.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn commands_are_rejected_in_the_wrong_state() {
    let device = MockDevice::new();
    let sink = MockSink::new(Duration::from_secs(1));
    let transcriber = ScriptedTranscriber::new(&[(1, "one")]);
    let session = session(&["one"], &device, &sink, &transcriber);

    assert!(matches!(
        session.advance().await,
        Err(DomainError::InvalidSessionState { .. })
    ));
    assert!(matches!(
        session.finish().await,
        Err(DomainError::InvalidSessionState { .. })
    ));
    assert!(matches!(
        session.retry().await,
        Err(DomainError::InvalidSessionState { .. })
    ));

    session.start().await.unwrap();
    assert!(matches!(
        session.start().await,
        Err(DomainError::InvalidSessionState { .. })
    ));
}
