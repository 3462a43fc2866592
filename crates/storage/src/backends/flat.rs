//! Flat single-document backend.
//!
//! The reference substrate: every collection is a nested map inside one
//! in-memory document guarded by a single async lock, with a global monotonic
//! version counter. When configured with a path, every successful mutation
//! rewrites the whole document to disk (temp file + fsync + rename), so the
//! durable form is always a complete, self-consistent snapshot.
//!
//! Conditional create and version-checked puts are trivially atomic here
//! because all mutations serialize on the document lock.

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, BlobStore, RecordStore, Version, VersionedRecord};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredRecord {
    version: Version,
    data: Value,
}

/// The entire persisted state of a flat backend.
#[derive(Default, Debug, Serialize, Deserialize)]
struct FlatDocument {
    /// Global monotonic version counter; each mutation takes the next value.
    version: Version,
    /// collection -> primary key -> record.
    collections: HashMap<String, HashMap<String, StoredRecord>>,
    /// Blob namespace, base64-encoded so the document stays valid JSON.
    blobs: HashMap<String, String>,
}

/// Single-document backend for local development and conformance testing.
#[derive(Debug)]
pub struct FlatBackend {
    state: Mutex<FlatDocument>,
    path: Option<PathBuf>,
}

impl FlatBackend {
    /// Open a flat backend, loading the document from `path` if it exists.
    /// With `path = None` the document lives in memory only.
    pub async fn new(path: Option<PathBuf>) -> BackendResult<Self> {
        let document = match &path {
            Some(path) => match fs::read(path).await {
                Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                    BackendError::Corrupt(format!("{}: {e}", path.display()))
                })?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if let Some(parent) = path.parent()
                        && !parent.as_os_str().is_empty()
                    {
                        fs::create_dir_all(parent).await?;
                    }
                    FlatDocument::default()
                }
                Err(e) => return Err(BackendError::Io(e)),
            },
            None => FlatDocument::default(),
        };

        Ok(Self {
            state: Mutex::new(document),
            path,
        })
    }

    /// Rewrite the whole document to disk.
    ///
    /// Write to a uniquely named temp file, fsync, then rename, so a crash
    /// mid-write leaves the previous snapshot intact.
    async fn persist(&self, document: &FlatDocument) -> BackendResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(document)?;
        let temp_path = path.with_file_name(format!(
            "{}.tmp.{}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4()
        ));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlatBackend {
    #[instrument(skip(self), fields(backend = "flat"))]
    async fn get_record(&self, collection: &str, key: &str) -> BackendResult<VersionedRecord> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .and_then(|records| records.get(key))
            .map(|record| VersionedRecord {
                version: record.version,
                data: record.data.clone(),
            })
            .ok_or_else(|| BackendError::NotFound(format!("{collection}/{key}")))
    }

    #[instrument(skip(self, data), fields(backend = "flat"))]
    async fn put_record(
        &self,
        collection: &str,
        key: &str,
        data: Value,
        expected_version: Option<Version>,
    ) -> BackendResult<Version> {
        let mut state = self.state.lock().await;
        let current = state
            .collections
            .get(collection)
            .and_then(|records| records.get(key))
            .map(|record| record.version);

        if let Some(expected) = expected_version
            && current != Some(expected)
        {
            return Err(BackendError::VersionConflict(match current {
                Some(found) => {
                    format!("{collection}/{key}: expected version {expected}, found {found}")
                }
                None => format!("{collection}/{key}: expected version {expected}, record gone"),
            }));
        }

        state.version += 1;
        let version = state.version;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), StoredRecord { version, data });
        self.persist(&state).await?;
        Ok(version)
    }

    #[instrument(skip(self, data), fields(backend = "flat"))]
    async fn create_record_if_absent(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> BackendResult<Version> {
        let mut state = self.state.lock().await;
        if state
            .collections
            .get(collection)
            .is_some_and(|records| records.contains_key(key))
        {
            return Err(BackendError::Conflict(format!("{collection}/{key}")));
        }

        state.version += 1;
        let version = state.version;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), StoredRecord { version, data });
        self.persist(&state).await?;
        Ok(version)
    }

    #[instrument(skip(self), fields(backend = "flat"))]
    async fn delete_record(&self, collection: &str, key: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.remove(key));
        if removed.is_none() {
            return Err(BackendError::NotFound(format!("{collection}/{key}")));
        }
        state.version += 1;
        self.persist(&state).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FlatBackend {
    #[instrument(skip(self), fields(backend = "flat"))]
    async fn get_blob(&self, name: &str) -> BackendResult<Bytes> {
        use base64::Engine;
        let state = self.state.lock().await;
        let encoded = state
            .blobs
            .get(name)
            .ok_or_else(|| BackendError::NotFound(format!("blob {name}")))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BackendError::Corrupt(format!("blob {name}: {e}")))?;
        Ok(Bytes::from(bytes))
    }

    #[instrument(skip(self, data), fields(backend = "flat", size = data.len()))]
    async fn put_blob(&self, name: &str, data: Bytes) -> BackendResult<()> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        let mut state = self.state.lock().await;
        state.blobs.insert(name.to_string(), encoded);
        state.version += 1;
        self.persist(&state).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "flat"))]
    async fn delete_blob(&self, name: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        if state.blobs.remove(name).is_none() {
            return Err(BackendError::NotFound(format!("blob {name}")));
        }
        state.version += 1;
        self.persist(&state).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for FlatBackend {
    fn backend_name(&self) -> &'static str {
        "flat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_conditional_create_conflicts() {
        let backend = FlatBackend::new(None).await.unwrap();
        backend
            .create_record_if_absent("accounts", "a", json!({"n": 1}))
            .await
            .unwrap();
        let err = backend
            .create_record_if_absent("accounts", "a", json!({"n": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_versions_are_globally_monotonic() {
        let backend = FlatBackend::new(None).await.unwrap();
        let v1 = backend
            .create_record_if_absent("a", "x", json!(1))
            .await
            .unwrap();
        let v2 = backend
            .create_record_if_absent("b", "y", json!(2))
            .await
            .unwrap();
        let v3 = backend.put_record("a", "x", json!(3), Some(v1)).await.unwrap();
        assert!(v1 < v2 && v2 < v3);
    }

    #[tokio::test]
    async fn test_stale_put_is_rejected() {
        let backend = FlatBackend::new(None).await.unwrap();
        let v1 = backend
            .create_record_if_absent("a", "x", json!(1))
            .await
            .unwrap();
        backend.put_record("a", "x", json!(2), Some(v1)).await.unwrap();
        let err = backend
            .put_record("a", "x", json!(3), Some(v1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn test_put_on_deleted_record_with_expected_version() {
        let backend = FlatBackend::new(None).await.unwrap();
        let v1 = backend
            .create_record_if_absent("a", "x", json!(1))
            .await
            .unwrap();
        backend.delete_record("a", "x").await.unwrap();
        let err = backend
            .put_record("a", "x", json!(2), Some(v1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::VersionConflict(_)));
    }
}
