//! Error types for CLI operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Input line that is not a valid event
    #[error("Invalid event on line {line}: {message}")]
    InvalidEvent { line: usize, message: String },

    /// Dispatches still queued when the drain deadline passed
    #[error("{pending} Dispatches still pending after drain timeout")]
    DrainIncomplete { pending: usize },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn invalid_event(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            line,
            message: message.into(),
        }
    }
}
