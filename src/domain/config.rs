use serde::{Deserialize, Serialize};

use crate::domain::audio::CaptureConfig;
use crate::domain::session::SessionConfig;

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
    /// Maximum number of log files to keep.
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
            max_files: 7,
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Create a new EngineConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }
}
