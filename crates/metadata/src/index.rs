//! Membership index: facade-managed "children of an owner" records.
//!
//! The adapter contract is point-lookup only, so listing an account's apps or
//! an app's deployments cannot scan a collection. Instead the facade keeps
//! one small record per owner listing member ids, maintained with the same
//! optimistic read-modify-write discipline as the history ledger. Entity
//! collections stay authoritative; these records are bookkeeping.

use crate::error::{MetadataError, MetadataResult};
use crate::lock::KeyedLocks;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use updraft_storage::{Backend, BackendError, RecordStore};

const MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Membership {
    members: Vec<String>,
}

/// Per-owner membership lists over a backend.
#[derive(Debug)]
pub struct MembershipIndex {
    backend: Arc<dyn Backend>,
    locks: KeyedLocks,
}

impl MembershipIndex {
    /// Create a membership index over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
        }
    }

    /// Add `member` to the owner's list. Idempotent.
    pub async fn add(&self, collection: &str, owner: &str, member: &str) -> MetadataResult<()> {
        self.update(collection, owner, |members| {
            if members.iter().any(|m| m == member) {
                false
            } else {
                members.push(member.to_string());
                true
            }
        })
        .await
    }

    /// Remove `member` from the owner's list. Idempotent.
    pub async fn remove(&self, collection: &str, owner: &str, member: &str) -> MetadataResult<()> {
        self.update(collection, owner, |members| {
            let before = members.len();
            members.retain(|m| m != member);
            members.len() != before
        })
        .await
    }

    /// List the owner's members, in insertion order. Empty if the owner has
    /// none (or was never seen).
    pub async fn list(&self, collection: &str, owner: &str) -> MetadataResult<Vec<String>> {
        match self.backend.get_record(collection, owner).await {
            Ok(record) => {
                let membership: Membership = serde_json::from_value(record.data)?;
                Ok(membership.members)
            }
            Err(BackendError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the owner's whole list. Idempotent; used when the owner entity is
    /// deleted.
    pub async fn clear(&self, collection: &str, owner: &str) -> MetadataResult<()> {
        let _guard = self.locks.acquire(&lock_key(collection, owner)).await;
        match self.backend.delete_record(collection, owner).await {
            Ok(()) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: &str,
        owner: &str,
        mutate: impl Fn(&mut Vec<String>) -> bool,
    ) -> MetadataResult<()> {
        let _guard = self.locks.acquire(&lock_key(collection, owner)).await;

        for _attempt in 1..=MAX_ATTEMPTS {
            let current = match self.backend.get_record(collection, owner).await {
                Ok(record) => Some(record),
                Err(BackendError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };

            let mut membership = match &current {
                Some(record) => serde_json::from_value::<Membership>(record.data.clone())?,
                None => Membership::default(),
            };
            if !mutate(&mut membership.members) {
                return Ok(());
            }

            let payload = serde_json::to_value(&membership)?;
            let written = match &current {
                Some(record) => {
                    self.backend
                        .put_record(collection, owner, payload, Some(record.version))
                        .await
                }
                None => {
                    self.backend
                        .create_record_if_absent(collection, owner, payload)
                        .await
                }
            };

            match written {
                Ok(_) => return Ok(()),
                Err(BackendError::VersionConflict(_)) | Err(BackendError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(MetadataError::VersionConflict(format!(
            "membership update for {collection}/{owner} kept losing races"
        )))
    }
}

fn lock_key(collection: &str, owner: &str) -> String {
    format!("{collection}/{owner}")
}
