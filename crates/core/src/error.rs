//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
///
/// Every variant describes input the caller must fix; nothing in this crate
/// touches storage, so none of these are retryable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid deployment key: {0}")]
    InvalidKey(String),

    #[error("invalid rollout: {0} (must be between 1 and 100)")]
    InvalidRollout(u8),

    #[error("unknown permission: {0}")]
    InvalidPermission(String),

    #[error("unknown access key scope: {0}")]
    InvalidScope(String),

    #[error("unknown release method: {0}")]
    InvalidReleaseMethod(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
