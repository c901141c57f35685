use crate::domain::session::SessionState;
use thiserror::Error;

/// Domain-level errors for OpenShadow.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Audio input device denied: {message}")]
    DeviceDenied { message: String },

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Playback failed: {message}")]
    PlaybackFailed { message: String },

    #[error("Reference audio not found for exercise {exercise_id}, turn {turn_id:?}")]
    AudioNotFound {
        exercise_id: i64,
        turn_id: Option<i64>,
    },

    #[error("No non-empty recordings to finish the session with")]
    NoRecordings,

    #[error("Transcription service error: {0}")]
    Transcription(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Command {command} is not valid in session state {state:?}")]
    InvalidSessionState {
        command: &'static str,
        state: SessionState,
    },

    #[error("Session was cancelled")]
    Cancelled,
}

impl DomainError {
    /// Whether the session can continue after this error.
    ///
    /// Recoverable errors are reported per turn or per finish attempt;
    /// only an explicit cancel or a successful finish ends a session.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DomainError::PlaybackFailed { .. }
                | DomainError::AudioNotFound { .. }
                | DomainError::NoRecordings
                | DomainError::Transcription(_)
        )
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(DomainError::NoRecordings.is_recoverable());
        assert!(DomainError::PlaybackFailed {
            message: "decode".to_string()
        }
        .is_recoverable());
        assert!(DomainError::Transcription("503".to_string()).is_recoverable());

        assert!(!DomainError::DeviceDenied {
            message: "permission refused".to_string()
        }
        .is_recoverable());
        assert!(!DomainError::Cancelled.is_recoverable());
    }
}
