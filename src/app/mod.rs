pub mod capture;
pub mod playback;
pub mod session;

pub use capture::CaptureController;
pub use playback::PlaybackController;
pub use session::SessionController;
