//! Backend adapter trait definitions.
//!
//! The contract is deliberately small: primary-key record access with
//! optimistic versioning and conditional create, plus whole-object blobs.
//! Secondary indexes, uniqueness, and ordered history are all built above
//! this line, so any substrate that can honor these primitives (a flat
//! document, a table-plus-blob service, a relational engine) yields
//! identical observable semantics.

use crate::error::BackendResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::fmt::Debug;

/// Monotonic record version used for optimistic concurrency.
pub type Version = u64;

/// A stored record together with its current version.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionedRecord {
    /// Version to pass back as `expected_version` when replacing the record.
    pub version: Version,
    /// Record payload.
    pub data: Value,
}

/// Primary-key record access.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a record by primary key. Fails `NotFound` if absent.
    async fn get_record(&self, collection: &str, key: &str) -> BackendResult<VersionedRecord>;

    /// Put a record, replacing whatever is stored.
    ///
    /// With `expected_version` set, the write succeeds only if the stored
    /// version still matches; otherwise it fails `VersionConflict` (including
    /// when the record has been deleted). Returns the new version.
    async fn put_record(
        &self,
        collection: &str,
        key: &str,
        data: Value,
        expected_version: Option<Version>,
    ) -> BackendResult<Version>;

    /// Create a record only if the key is absent. Fails `Conflict` otherwise.
    ///
    /// This is the serialization primitive uniqueness is built on: two
    /// concurrent creates of the same key must never both succeed.
    async fn create_record_if_absent(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> BackendResult<Version>;

    /// Delete a record. Fails `NotFound` if absent.
    async fn delete_record(&self, collection: &str, key: &str) -> BackendResult<()>;
}

/// Whole-object blob access.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Get a blob's content. Fails `NotFound` if absent.
    async fn get_blob(&self, name: &str) -> BackendResult<Bytes>;

    /// Put a blob, replacing whatever is stored.
    async fn put_blob(&self, name: &str, data: Bytes) -> BackendResult<()>;

    /// Delete a blob. Fails `NotFound` if absent.
    async fn delete_blob(&self, name: &str) -> BackendResult<()>;
}

/// A complete backend: records plus blobs.
#[async_trait]
pub trait Backend: RecordStore + BlobStore + Debug {
    /// Static identifier for the backend type (e.g. "flat", "sqlite").
    /// Used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity.
    ///
    /// Called once during startup so misconfiguration fails fast instead of
    /// failing the first real operation. The default implementation returns
    /// `Ok(())`, suitable for backends with nothing to probe.
    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}
