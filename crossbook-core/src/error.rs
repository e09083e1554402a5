//! Error types for the order book pipeline

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum CrossbookError {
    /// Connect or send failure on a venue stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected venue frame
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrossbookError {
    pub fn transport(msg: impl Into<String>) -> Self {
        CrossbookError::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        CrossbookError::Parse(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        CrossbookError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        CrossbookError::Network(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CrossbookError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CrossbookError::Internal(msg.into())
    }
}

impl From<serde_json::Error> for CrossbookError {
    fn from(e: serde_json::Error) -> Self {
        CrossbookError::Parse(e.to_string())
    }
}

/// Result type alias for pipeline operations
pub type CrossbookResult<T> = Result<T, CrossbookError>;
