//! Store error types

use std::path::PathBuf;

use thiserror::Error;

/// Persistence error
///
/// Any failed store operation leaves the stored state unchanged.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Storage engine failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload could not be (de)serialized
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Database could not be opened or initialized
    #[error("failed to open dispatch store at '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The write sequencer has shut down
    #[error("dispatch store sequencer has shut down")]
    SequencerClosed,

    /// A `DispatchEditor` was used after `commit`
    #[error("dispatch editor used after commit")]
    EditorClosed,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
