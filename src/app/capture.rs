use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::domain::{
    AtomicCaptureState, AudioBuffer, AudioChunk, CaptureConfig, CaptureState, DomainError,
    Recording,
};
use crate::ports::{CaptureDevice, CaptureStream};

/// Owns the lifecycle of one recording attempt: device acquisition, chunk
/// buffering, stability signalling, the auto-stop ceiling and finalization.
///
/// The pump task runs until stopped (manually or by the ceiling), then
/// closes the stream, concatenates the buffered chunks into a single
/// [`AudioBuffer`] and parks the finished [`Recording`] for collection.
/// Cloning shares the same attempt; the device is exclusively owned until
/// the stream closes.
#[derive(Clone)]
pub struct CaptureController {
    state: Arc<AtomicCaptureState>,
    config: CaptureConfig,
    stable_rx: watch::Receiver<Option<Instant>>,
    stop_tx: Arc<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
    finalized: Arc<Mutex<Option<Recording>>>,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController").finish_non_exhaustive()
    }
}

impl CaptureController {
    /// Acquire the input device and enter Recording.
    ///
    /// Device acquisition failures surface as [`DomainError::DeviceDenied`]
    /// and are terminal for the attempt; they are never retried here.
    pub async fn start(
        device: Arc<dyn CaptureDevice>,
        turn_id: i64,
        config: CaptureConfig,
    ) -> Result<Self, DomainError> {
        let state = Arc::new(AtomicCaptureState::new(CaptureState::Acquiring));

        let stream = match device.open().await {
            Ok(stream) => stream,
            Err(e) => {
                state.store(CaptureState::Idle);
                return Err(e);
            }
        };

        let (stable_tx, stable_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let finalized = Arc::new(Mutex::new(None));

        state.store(CaptureState::Recording);
        info!(turn_id, "Recording started");

        tokio::spawn(pump(
            stream,
            turn_id,
            config.clone(),
            Arc::clone(&state),
            stable_tx,
            stop_rx,
            done_tx,
            Arc::clone(&finalized),
        ));

        Ok(Self {
            state,
            config,
            stable_rx,
            stop_tx: Arc::new(stop_tx),
            done_rx,
            finalized,
        })
    }

    /// Run the once-per-session discard-recording warm-up cycle.
    ///
    /// On first use after a permission grant the capture pipeline has an
    /// initial silent period; recording and discarding a short burst
    /// absorbs that latency before the first turn. Best-effort: failures
    /// are logged and never fail the session.
    pub async fn warm_up(device: &Arc<dyn CaptureDevice>, config: &CaptureConfig) {
        match device.open().await {
            Ok(mut stream) => {
                let deadline = Instant::now() + config.warmup();
                loop {
                    tokio::select! {
                        _ = time::sleep_until(deadline) => break,
                        chunk = stream.next_chunk() => {
                            if chunk.is_none() {
                                break;
                            }
                        }
                    }
                }
                stream.close().await;
                debug!("Capture warm-up cycle complete");
            }
            Err(e) => {
                warn!(error = %e, "Capture warm-up failed; continuing without it");
            }
        }
    }

    /// Resolve once the first non-empty chunk has arrived plus the settle
    /// margin, or once the absolute ceiling elapses, whichever comes first.
    ///
    /// Returns the first-chunk timestamp when stability was observed.
    /// Callers use this to avoid starting reference playback before the
    /// microphone is demonstrably capturing.
    pub async fn wait_until_stable(&self) -> Option<Instant> {
        let settle = self.config.settle_margin();
        let mut rx = self.stable_rx.clone();

        let observed = async move {
            let at = loop {
                if let Some(at) = *rx.borrow_and_update() {
                    break at;
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            };
            time::sleep(settle).await;
            Some(at)
        };

        match time::timeout(self.config.stability_timeout(), observed).await {
            Ok(at) => at,
            Err(_) => {
                warn!("Capture stability not observed within the ceiling; proceeding");
                None
            }
        }
    }

    /// Stop the recording and collect the finished buffer.
    ///
    /// Idempotent and never hangs: if the recording already stopped (auto
    /// or manual) this just collects; the recording is handed out exactly
    /// once, so repeat calls return None. A zero-length buffer is a valid
    /// outcome.
    pub async fn stop(&self) -> Option<Recording> {
        let _ = self.stop_tx.send(true);

        let mut done = self.done_rx.clone();
        loop {
            if *done.borrow_and_update() {
                break;
            }
            if done.changed().await.is_err() {
                break;
            }
        }

        self.finalized.lock().take()
    }

    pub fn state(&self) -> CaptureState {
        self.state.load()
    }

    /// Timestamp of the first non-empty chunk, once observed.
    pub fn stable_at(&self) -> Option<Instant> {
        *self.stable_rx.borrow()
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump(
    mut stream: Box<dyn CaptureStream>,
    turn_id: i64,
    config: CaptureConfig,
    state: Arc<AtomicCaptureState>,
    stable_tx: watch::Sender<Option<Instant>>,
    mut stop_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    finalized: Arc<Mutex<Option<Recording>>>,
) {
    let deadline = Instant::now() + config.auto_stop();
    let mut chunks: Vec<AudioChunk> = Vec::new();
    let mut first_seen = false;

    let stopped = loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                // Manual stop, or the controller went away entirely.
                let _ = changed;
                break CaptureState::ManuallyStopped;
            }
            _ = time::sleep_until(deadline) => {
                // The ceiling is a normal transition, not a failure.
                debug!(turn_id, "Capture auto-stop ceiling reached");
                break CaptureState::AutoStopped;
            }
            chunk = stream.next_chunk() => match chunk {
                Some(chunk) => {
                    if !first_seen && !chunk.samples.is_empty() {
                        first_seen = true;
                        let _ = stable_tx.send(Some(chunk.captured_at));
                    }
                    chunks.push(chunk);
                }
                None => break CaptureState::ManuallyStopped,
            },
        }
    };
    state.store(stopped);

    // Release the device before finalizing; the next acquisition must
    // never race a half-closed stream.
    stream.close().await;

    let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
    let mut audio = AudioBuffer::with_capacity(config.sample_rate, total);
    for chunk in &chunks {
        audio.push_samples(&chunk.samples);
    }

    *finalized.lock() = Some(Recording {
        turn_id,
        audio,
        captured_at: Instant::now(),
    });
    state.store(CaptureState::Finalized);
    let _ = done_tx.send(true);

    info!(turn_id, samples = total, "Recording finalized");
}
