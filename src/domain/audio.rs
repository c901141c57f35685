use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Capture lifecycle for one recording attempt.
///
/// State transitions:
/// - Idle -> Acquiring (start)
/// - Acquiring -> Recording (device delivered)
/// - Acquiring -> Idle (DeviceDenied, terminal for the attempt)
/// - Idle -> Warming -> Idle (once-per-session warm-up cycle)
/// - Recording -> AutoStopped (20 s ceiling elapsed)
/// - Recording -> ManuallyStopped (stop command)
/// - AutoStopped | ManuallyStopped -> Finalized (buffer assembled, device released)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CaptureState {
    /// No active capture.
    Idle = 0,
    /// Requesting an audio input device.
    Acquiring = 1,
    /// Discard-recording warm-up cycle to absorb first-use pipeline latency.
    Warming = 2,
    /// Actively buffering timestamped chunks.
    Recording = 3,
    /// The auto-stop ceiling fired. Not an error.
    AutoStopped = 4,
    /// Stop was requested before the ceiling.
    ManuallyStopped = 5,
    /// Chunks concatenated into a single buffer, device released.
    Finalized = 6,
}

impl CaptureState {
    /// Whether the capture is still producing or holding data.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CaptureState::Acquiring | CaptureState::Warming | CaptureState::Recording
        )
    }

    /// Whether the recording has stopped (by either path).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            CaptureState::AutoStopped | CaptureState::ManuallyStopped | CaptureState::Finalized
        )
    }
}

impl From<u8> for CaptureState {
    fn from(value: u8) -> Self {
        match value {
            0 => CaptureState::Idle,
            1 => CaptureState::Acquiring,
            2 => CaptureState::Warming,
            3 => CaptureState::Recording,
            4 => CaptureState::AutoStopped,
            5 => CaptureState::ManuallyStopped,
            _ => CaptureState::Finalized,
        }
    }
}

impl From<CaptureState> for u8 {
    fn from(state: CaptureState) -> Self {
        state as u8
    }
}

/// Atomic wrapper for CaptureState for lock-free reads.
#[derive(Debug)]
pub struct AtomicCaptureState(AtomicU8);

impl AtomicCaptureState {
    pub fn new(state: CaptureState) -> Self {
        Self(AtomicU8::new(state.into()))
    }

    pub fn load(&self) -> CaptureState {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, state: CaptureState) {
        self.0.store(state.into(), Ordering::Release);
    }
}

impl Default for AtomicCaptureState {
    fn default() -> Self {
        Self::new(CaptureState::Idle)
    }
}

/// Playback lifecycle for one turn's reference audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackState {
    /// Nothing playing; also the state after cancellation.
    Idle = 0,
    /// Fetching/decoding the reference clip.
    Loading = 1,
    Playing = 2,
    /// Natural end of the clip. Fires exactly once.
    Completed = 3,
    /// Clip could not be loaded or decoded. Recoverable per turn.
    Failed = 4,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            0 => PlaybackState::Idle,
            1 => PlaybackState::Loading,
            2 => PlaybackState::Playing,
            3 => PlaybackState::Completed,
            _ => PlaybackState::Failed,
        }
    }
}

impl From<PlaybackState> for u8 {
    fn from(state: PlaybackState) -> Self {
        state as u8
    }
}

/// Atomic wrapper for PlaybackState.
#[derive(Debug)]
pub struct AtomicPlaybackState(AtomicU8);

impl AtomicPlaybackState {
    pub fn new(state: PlaybackState) -> Self {
        Self(AtomicU8::new(state.into()))
    }

    pub fn load(&self) -> PlaybackState {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, state: PlaybackState) {
        self.0.store(state.into(), Ordering::Release);
    }
}

impl Default for AtomicPlaybackState {
    fn default() -> Self {
        Self::new(PlaybackState::Idle)
    }
}

/// Capture timing and format configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Settle margin after the first non-empty chunk before capture is
    /// considered stable.
    pub settle_margin_ms: u64,
    /// Absolute ceiling on the stability wait.
    pub stability_timeout_ms: u64,
    /// Auto-stop countdown started at Recording entry.
    pub auto_stop_secs: u64,
    /// Duration of the once-per-session discard-recording warm-up.
    pub warmup_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            settle_margin_ms: 300,
            stability_timeout_ms: 5_000,
            auto_stop_secs: 20,
            warmup_ms: 500,
        }
    }
}

impl CaptureConfig {
    pub fn settle_margin(&self) -> Duration {
        Duration::from_millis(self.settle_margin_ms)
    }

    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    pub fn auto_stop(&self) -> Duration {
        Duration::from_secs(self.auto_stop_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}
