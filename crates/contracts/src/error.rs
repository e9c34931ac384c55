//! Layered error definitions
//!
//! Categorized by source: config / dispatcher / transport

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Dispatcher Errors =====
    /// Dispatcher write error
    #[error("dispatcher '{dispatcher}' write error: {message}")]
    DispatcherWrite { dispatcher: String, message: String },

    /// Dispatcher connection error
    #[error("dispatcher '{dispatcher}' connection error: {message}")]
    DispatcherConnection { dispatcher: String, message: String },

    // ===== Transport Errors =====
    /// Transport send failure
    #[error("transport '{endpoint}' error: {message}")]
    Transport { endpoint: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create dispatcher write error
    pub fn dispatcher_write(dispatcher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DispatcherWrite {
            dispatcher: dispatcher.into(),
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}
