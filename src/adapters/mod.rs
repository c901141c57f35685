pub mod capture_cpal;
pub mod config_store;
pub mod playback_rodio;

pub use capture_cpal::CpalCaptureDevice;
pub use config_store::TomlConfigStore;
pub use playback_rodio::RodioPlaybackSink;
