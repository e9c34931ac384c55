//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Dispatcher creation error
    #[error("failed to create dispatcher '{name}': {message}")]
    Creation { name: String, message: String },

    /// A drain loop for this consumer is already running
    #[error("consumer '{0}' is already enabled")]
    AlreadyEnabled(String),

    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] dispatch_store::PersistenceError),

    /// Dispatcher or transport error (from contract)
    #[error("dispatcher error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a dispatcher creation error
    pub fn creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Creation {
            name: name.into(),
            message: message.into(),
        }
    }
}
