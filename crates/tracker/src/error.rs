//! Tracker error types

use thiserror::Error;

/// Tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The store could not be opened or prepared; the instance is unusable
    #[error("tracker initialization failed: {0}")]
    Initialization(#[source] dispatch_store::PersistenceError),

    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] dispatch_store::PersistenceError),

    /// Dispatcher creation or management failed
    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Event rejected before persisting
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
