pub mod capture;
pub mod config;
pub mod playback;
pub mod reference;
pub mod results;
pub mod transcriber;

pub use capture::{CaptureDevice, CaptureStream};
pub use config::ConfigStore;
pub use playback::{PlaybackHandle, PlaybackProgress, PlaybackSink};
pub use reference::ReferenceAudio;
pub use results::{ResultStore, SavedResult};
pub use transcriber::{BatchItem, Transcriber, TurnTranscript};
