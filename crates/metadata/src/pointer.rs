//! Pointer index: secondary lookups over a primary-key-only backend.
//!
//! For each `(kind, value)` alternate key the index keeps one lightweight
//! record whose primary key is derived deterministically
//! (`"email:<normalized email>"`, `"deploymentKey:<key>"`,
//! `"accessKey:<token>"`) and whose payload names the owning entity. Because
//! the backend's conditional create is atomic, at most one pointer can ever
//! exist per alternate key, which is exactly the uniqueness guarantee the
//! entities above need.

use crate::error::{MetadataError, MetadataResult};
use crate::lock::KeyedLocks;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use updraft_storage::{Backend, BackendError, RecordStore};

/// Collection holding all pointer records.
pub const POINTER_COLLECTION: &str = "pointers";

/// The kinds of alternate key the store resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Account email -> account id.
    Email,
    /// Deployment key -> deployment id.
    DeploymentKey,
    /// Access-key token -> account id.
    AccessKey,
}

impl PointerKind {
    /// Get the string representation used in record keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::DeploymentKey => "deploymentKey",
            Self::AccessKey => "accessKey",
        }
    }

    /// Primary record key for an alternate-key value.
    pub fn record_key(&self, value: &str) -> String {
        format!("{}:{value}", self.as_str())
    }
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of a pointer record.
///
/// `owner_id` is the resolved entity; the rest are denormalized hints the
/// facade stores alongside (the entity record stays authoritative).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    /// Primary id of the owning entity.
    pub owner_id: String,
    /// App owning the deployment, for deployment-key pointers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Access-key record id, for access-key pointers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    /// Advisory expiry hint, for access-key pointers.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<OffsetDateTime>,
}

impl Pointer {
    /// Create a pointer to `owner_id` with no hints.
    pub fn to(owner_id: impl fmt::Display) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            app_id: None,
            access_key_id: None,
            expires: None,
        }
    }
}

/// The pointer index over a backend.
#[derive(Debug)]
pub struct PointerIndex {
    backend: Arc<dyn Backend>,
    locks: KeyedLocks,
}

impl PointerIndex {
    /// Create a pointer index over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
        }
    }

    /// Reserve `(kind, value)` for `pointer.owner_id`.
    ///
    /// Fails `Conflict` if the alternate key is already taken by a different
    /// owner. Re-reserving for the same owner is idempotent success, so a
    /// retried facade operation doesn't trip over its own reservation.
    pub async fn reserve(
        &self,
        kind: PointerKind,
        value: &str,
        pointer: &Pointer,
    ) -> MetadataResult<()> {
        let key = kind.record_key(value);
        let _guard = self.locks.acquire(&key).await;

        match self
            .backend
            .create_record_if_absent(POINTER_COLLECTION, &key, serde_json::to_value(pointer)?)
            .await
        {
            Ok(_) => Ok(()),
            Err(BackendError::Conflict(_)) => {
                let existing = self.resolve_key(&key).await?;
                if existing.owner_id == pointer.owner_id {
                    Ok(())
                } else {
                    Err(MetadataError::Conflict(format!("{kind} '{value}' already reserved")))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve `(kind, value)` to its pointer. Fails `NotFound`.
    pub async fn resolve(&self, kind: PointerKind, value: &str) -> MetadataResult<Pointer> {
        self.resolve_key(&kind.record_key(value)).await
    }

    async fn resolve_key(&self, key: &str) -> MetadataResult<Pointer> {
        let record = self
            .backend
            .get_record(POINTER_COLLECTION, key)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(_) => MetadataError::NotFound(format!("pointer {key}")),
                other => other.into(),
            })?;
        Ok(serde_json::from_value(record.data)?)
    }

    /// Atomically move a reservation from `old_value` to `new_value`.
    ///
    /// Either both steps land or neither does: if reserving the new key
    /// fails, the old pointer is restored before the error surfaces, so no
    /// caller ever observes a state where both or neither value resolves.
    pub async fn rename(
        &self,
        kind: PointerKind,
        old_value: &str,
        new_value: &str,
        pointer: &Pointer,
    ) -> MetadataResult<()> {
        if old_value == new_value {
            // Nothing to move; just confirm the reservation exists.
            self.resolve(kind, old_value).await?;
            return Ok(());
        }

        let old_key = kind.record_key(old_value);
        let new_key = kind.record_key(new_value);

        // Lock both keys in deterministic order so two concurrent renames
        // touching the same pair cannot deadlock.
        let (first, second) = if old_key <= new_key {
            (&old_key, &new_key)
        } else {
            (&new_key, &old_key)
        };
        let _guard_first = self.locks.acquire(first).await;
        let _guard_second = self.locks.acquire(second).await;

        let old_record = self
            .backend
            .get_record(POINTER_COLLECTION, &old_key)
            .await
            .map_err(|e| match e {
                BackendError::NotFound(_) => {
                    MetadataError::NotFound(format!("pointer {old_key}"))
                }
                other => other.into(),
            })?;

        self.backend
            .delete_record(POINTER_COLLECTION, &old_key)
            .await?;

        match self
            .backend
            .create_record_if_absent(POINTER_COLLECTION, &new_key, serde_json::to_value(pointer)?)
            .await
        {
            Ok(_) => Ok(()),
            Err(reserve_err) => {
                // Restore the old pointer so the rename never half-applies.
                if let Err(restore_err) = self
                    .backend
                    .put_record(POINTER_COLLECTION, &old_key, old_record.data, None)
                    .await
                {
                    tracing::error!(
                        key = %old_key,
                        error = %restore_err,
                        "failed to restore pointer while rolling back rename"
                    );
                    return Err(restore_err.into());
                }
                match reserve_err {
                    BackendError::Conflict(_) => Err(MetadataError::Conflict(format!(
                        "{kind} '{new_value}' already reserved"
                    ))),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Release `(kind, value)`.
    ///
    /// Idempotent: releasing an absent pointer is success, because this runs
    /// on entity-deletion and compensation paths that must not fail twice.
    pub async fn release(&self, kind: PointerKind, value: &str) -> MetadataResult<()> {
        let key = kind.record_key(value);
        let _guard = self.locks.acquire(&key).await;
        match self.backend.delete_record(POINTER_COLLECTION, &key).await {
            Ok(()) => Ok(()),
            Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
