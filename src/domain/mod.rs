pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod exercise;
pub mod recording;
pub mod scoring;
pub mod session;
pub mod text;

pub use audio::{
    AtomicCaptureState, AtomicPlaybackState, CaptureConfig, CaptureState, PlaybackState,
};
pub use alignment::{align, Alignment};
pub use config::{EngineConfig, LoggingConfig};
pub use error::DomainError;
pub use exercise::{Exercise, Turn};
pub use recording::{AudioBuffer, AudioChunk, AudioClip, Recording};
pub use scoring::{score_session, score_turn, SessionResult, TurnResult};
pub use text::{tokenize, Token, TokenKind};
pub use session::{SessionConfig, SessionEvent, SessionState};
