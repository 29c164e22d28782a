//! Error types for keybucket.

use std::time::Duration;

use thiserror::Error;

/// Main error type for keybucket operations.
#[derive(Error, Debug)]
pub enum KeybucketError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate and window that cannot produce a positive leak interval
    #[error("Invalid rate: {rate} per {window:?} yields no positive leak interval")]
    InvalidRate { rate: u32, window: Duration },

    /// A store bound that cannot hold any key
    #[error("Invalid max keys: must be at least 1")]
    InvalidMaxKeys,

    /// The leak scheduler was started outside a tokio runtime
    #[error("No tokio runtime available to run the leak scheduler")]
    NoRuntime,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<::config::ConfigError> for KeybucketError {
    fn from(err: ::config::ConfigError) -> Self {
        KeybucketError::Config(err.to_string())
    }
}

/// Result type alias for keybucket operations.
pub type Result<T> = std::result::Result<T, KeybucketError>;
