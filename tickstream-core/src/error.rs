//! Error types for the price streaming service

use thiserror::Error;

/// Service-wide error type
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    pub fn transport(msg: impl Into<String>) -> Self {
        StreamError::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        StreamError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StreamError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        StreamError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        StreamError::Internal(msg.into())
    }
}

/// Result type alias for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;
