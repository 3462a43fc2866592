//! Timeout decorator for backends.
//!
//! Every backend call made through the store must complete within a bounded
//! budget; a call that outlives it is abandoned, best effort, by dropping the
//! underlying future, and surfaces as `Unavailable`, which callers may retry
//! with backoff. This wrapper applies one budget uniformly so individual
//! backends don't each reimplement deadline plumbing.

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, BlobStore, RecordStore, Version, VersionedRecord};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A backend whose every call is bounded by a fixed timeout.
#[derive(Debug)]
pub struct TimedBackend {
    inner: Arc<dyn Backend>,
    budget: Duration,
}

impl TimedBackend {
    /// Wrap `inner` so each primitive call gets at most `budget`.
    pub fn new(inner: Arc<dyn Backend>, budget: Duration) -> Self {
        Self { inner, budget }
    }

    async fn timed<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = BackendResult<T>> + Send,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Unavailable(format!(
                "{what} timed out after {:?}",
                self.budget
            ))),
        }
    }
}

#[async_trait]
impl RecordStore for TimedBackend {
    async fn get_record(&self, collection: &str, key: &str) -> BackendResult<VersionedRecord> {
        self.timed("get_record", self.inner.get_record(collection, key))
            .await
    }

    async fn put_record(
        &self,
        collection: &str,
        key: &str,
        data: Value,
        expected_version: Option<Version>,
    ) -> BackendResult<Version> {
        self.timed(
            "put_record",
            self.inner.put_record(collection, key, data, expected_version),
        )
        .await
    }

    async fn create_record_if_absent(
        &self,
        collection: &str,
        key: &str,
        data: Value,
    ) -> BackendResult<Version> {
        self.timed(
            "create_record_if_absent",
            self.inner.create_record_if_absent(collection, key, data),
        )
        .await
    }

    async fn delete_record(&self, collection: &str, key: &str) -> BackendResult<()> {
        self.timed("delete_record", self.inner.delete_record(collection, key))
            .await
    }
}

#[async_trait]
impl BlobStore for TimedBackend {
    async fn get_blob(&self, name: &str) -> BackendResult<Bytes> {
        self.timed("get_blob", self.inner.get_blob(name)).await
    }

    async fn put_blob(&self, name: &str, data: Bytes) -> BackendResult<()> {
        self.timed("put_blob", self.inner.put_blob(name, data)).await
    }

    async fn delete_blob(&self, name: &str) -> BackendResult<()> {
        self.timed("delete_blob", self.inner.delete_blob(name)).await
    }
}

#[async_trait]
impl Backend for TimedBackend {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> BackendResult<()> {
        self.timed("health_check", self.inner.health_check()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::flat::FlatBackend;
    use serde_json::json;

    #[derive(Debug)]
    struct StalledBackend(FlatBackend);

    #[async_trait]
    impl RecordStore for StalledBackend {
        async fn get_record(
            &self,
            _collection: &str,
            _key: &str,
        ) -> BackendResult<VersionedRecord> {
            // Never completes; the wrapper must cut it off.
            std::future::pending().await
        }

        async fn put_record(
            &self,
            collection: &str,
            key: &str,
            data: Value,
            expected_version: Option<Version>,
        ) -> BackendResult<Version> {
            self.0.put_record(collection, key, data, expected_version).await
        }

        async fn create_record_if_absent(
            &self,
            collection: &str,
            key: &str,
            data: Value,
        ) -> BackendResult<Version> {
            self.0.create_record_if_absent(collection, key, data).await
        }

        async fn delete_record(&self, collection: &str, key: &str) -> BackendResult<()> {
            self.0.delete_record(collection, key).await
        }
    }

    #[async_trait]
    impl BlobStore for StalledBackend {
        async fn get_blob(&self, name: &str) -> BackendResult<Bytes> {
            self.0.get_blob(name).await
        }

        async fn put_blob(&self, name: &str, data: Bytes) -> BackendResult<()> {
            self.0.put_blob(name, data).await
        }

        async fn delete_blob(&self, name: &str) -> BackendResult<()> {
            self.0.delete_blob(name).await
        }
    }

    #[async_trait]
    impl Backend for StalledBackend {
        fn backend_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_stalled_call_surfaces_unavailable() {
        let inner = StalledBackend(FlatBackend::new(None).await.unwrap());
        let backend = TimedBackend::new(Arc::new(inner), Duration::from_millis(20));

        let err = backend.get_record("accounts", "x").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let inner = StalledBackend(FlatBackend::new(None).await.unwrap());
        let backend = TimedBackend::new(Arc::new(inner), Duration::from_secs(1));

        backend
            .create_record_if_absent("accounts", "x", json!({"ok": true}))
            .await
            .unwrap();
        let err = backend
            .create_record_if_absent("accounts", "x", json!({"ok": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
    }
}
