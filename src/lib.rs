#![forbid(unsafe_code)]

//! Shadowing session engine.
//!
//! Drives read-along language practice: each turn plays a reference clip
//! while capturing the learner's voice, then batch-transcribes the takes
//! and scores them against the reference text by longest-common-subsequence
//! word alignment.
//!
//! The crate follows a hexagonal layout: pure types and algorithms in
//! [`domain`], async traits at the seams in [`ports`], orchestration in
//! [`app`], and cpal/rodio/TOML implementations in [`adapters`].

pub mod adapters;
pub mod app;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use app::{CaptureController, PlaybackController, SessionController};
pub use domain::{
    score_session, score_turn, tokenize, DomainError, EngineConfig, Exercise, SessionEvent,
    SessionResult, SessionState, Turn, TurnResult,
};
