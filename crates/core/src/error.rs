//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid upload session: {0}")]
    InvalidSession(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
