//! History ledger: the ordered, append-only record of every package ever
//! released to a deployment.
//!
//! The ledger for one deployment is a single JSON blob (an array of
//! summaries, oldest first). The blob primitives are unversioned whole-object
//! replaces, so each deployment also gets an anchor record in the `history`
//! collection whose version guards the read-modify-write: an appender that
//! loses the anchor race retries from a fresh read instead of silently
//! overwriting the other writer's entry. In-process appenders additionally
//! serialize on a per-deployment lock; the anchor check still catches writers
//! in other processes.

use crate::error::{MetadataError, MetadataResult};
use crate::lock::KeyedLocks;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use updraft_core::{DeploymentId, PackageSummary};
use updraft_storage::{Backend, BackendError, BlobStore, RecordStore};

/// Collection holding per-deployment append anchors.
pub const HISTORY_COLLECTION: &str = "history";

/// The history ledger over a backend.
#[derive(Debug)]
pub struct HistoryLedger {
    backend: Arc<dyn Backend>,
    locks: KeyedLocks,
    max_attempts: u32,
}

impl HistoryLedger {
    /// Create a history ledger over `backend`.
    ///
    /// `max_attempts` bounds how often an append retries after losing an
    /// optimistic-concurrency race before giving up with `Conflict`.
    pub fn new(backend: Arc<dyn Backend>, max_attempts: u32) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Append one entry to the end of a deployment's history.
    ///
    /// Entries are never reordered or removed once appended.
    pub async fn append(
        &self,
        deployment_id: &DeploymentId,
        entry: PackageSummary,
    ) -> MetadataResult<()> {
        let key = deployment_id.to_string();
        let _guard = self.locks.acquire(&key).await;

        for attempt in 1..=self.max_attempts {
            let anchor = match self.backend.get_record(HISTORY_COLLECTION, &key).await {
                Ok(record) => Some(record),
                Err(BackendError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            };

            let mut entries = self.read_entries(&key).await?;
            entries.push(entry.clone());
            let count = entries.len();

            // Advance the anchor first; whoever wins this write owns the
            // subsequent blob replace.
            let advanced = match &anchor {
                Some(record) => {
                    self.backend
                        .put_record(
                            HISTORY_COLLECTION,
                            &key,
                            json!({ "entries": count }),
                            Some(record.version),
                        )
                        .await
                }
                None => {
                    self.backend
                        .create_record_if_absent(
                            HISTORY_COLLECTION,
                            &key,
                            json!({ "entries": count }),
                        )
                        .await
                }
            };

            match advanced {
                Ok(_) => {
                    let bytes = Bytes::from(serde_json::to_vec(&entries)?);
                    self.backend.put_blob(&key, bytes).await?;
                    return Ok(());
                }
                Err(BackendError::VersionConflict(_)) | Err(BackendError::Conflict(_)) => {
                    tracing::debug!(
                        deployment_id = %key,
                        attempt,
                        "history append lost a race, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(MetadataError::Conflict(format!(
            "history append for deployment {key} kept losing races after {} attempts",
            self.max_attempts
        )))
    }

    /// Read a deployment's entire history, oldest first.
    ///
    /// A deployment with no releases yet yields an empty sequence, not an
    /// error.
    pub async fn read_all(
        &self,
        deployment_id: &DeploymentId,
    ) -> MetadataResult<Vec<PackageSummary>> {
        self.read_entries(&deployment_id.to_string()).await
    }

    /// Remove a deployment's whole ledger. Only called when the deployment
    /// itself is deleted; idempotent.
    pub async fn clear(&self, deployment_id: &DeploymentId) -> MetadataResult<()> {
        let key = deployment_id.to_string();
        let _guard = self.locks.acquire(&key).await;

        match self.backend.delete_blob(&key).await {
            Ok(()) | Err(BackendError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        match self.backend.delete_record(HISTORY_COLLECTION, &key).await {
            Ok(()) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_entries(&self, key: &str) -> MetadataResult<Vec<PackageSummary>> {
        match self.backend.get_blob(key).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(BackendError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
