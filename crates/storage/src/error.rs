//! Backend adapter error types.

use thiserror::Error;

/// Backend adapter operation errors.
///
/// Backends never swallow errors: every failure of a primitive surfaces as
/// one of these, and the layers above translate them 1:1 into the public
/// taxonomy.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
