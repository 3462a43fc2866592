//! Metadata store error types.

use thiserror::Error;
use updraft_storage::BackendError;

/// Metadata store operation errors.
///
/// This is the public taxonomy callers see. Backend failures translate 1:1:
/// nothing below swallows an error, and nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Malformed or missing input. Never retried; the caller must fix the
    /// request.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] updraft_core::Error),

    /// Referenced entity or alternate key is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-key collision, or a mid-operation invariant violation such as a
    /// failed pointer reservation.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Optimistic concurrency lost a race. Safe to retry the whole operation
    /// from scratch.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// Access key exists but its expiry is in the past. Distinct from
    /// `NotFound` so callers can give a specific message.
    #[error("access key expired: {0}")]
    Expired(String),

    /// Backend timeout or transient failure. Safe to retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Invariant breakage inside the store itself (e.g. a record that no
    /// longer deserializes). Not actionable by the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for MetadataError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(s) => Self::NotFound(s),
            BackendError::Conflict(s) => Self::Conflict(s),
            BackendError::VersionConflict(s) => Self::VersionConflict(s),
            BackendError::Unavailable(s) => Self::Unavailable(s),
            BackendError::Io(e) => Self::Unavailable(format!("I/O error: {e}")),
            BackendError::Database(e) => Self::Unavailable(format!("database error: {e}")),
            BackendError::Corrupt(s) => Self::Internal(format!("corrupt document: {s}")),
            BackendError::Serialization(e) => Self::Internal(format!("serialization error: {e}")),
            BackendError::Config(s) => Self::InvalidArgument(updraft_core::Error::Config(s)),
        }
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
