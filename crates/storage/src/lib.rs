//! Backend adapter contract and backends for Updraft.
//!
//! This crate provides:
//! - The record/blob contract every substrate implements (`traits`)
//! - The flat single-document reference backend
//! - A SQLite backend
//! - A timeout decorator bounding every backend call
//!
//! The pointer index and history ledger in `updraft-metadata` are written
//! purely against this contract, so swapping backends changes nothing above
//! this crate.

pub mod backends;
pub mod error;
pub mod timeout;
pub mod traits;

pub use backends::{flat::FlatBackend, sqlite::SqliteBackend};
pub use error::{BackendError, BackendResult};
pub use timeout::TimedBackend;
pub use traits::{Backend, BlobStore, RecordStore, Version, VersionedRecord};

use std::sync::Arc;
use updraft_core::config::{BackendConfig, StoreConfig};

/// Create a backend from configuration, wrapped with the configured
/// per-call timeout.
pub async fn from_config(config: &StoreConfig) -> BackendResult<Arc<dyn Backend>> {
    config.validate().map_err(BackendError::Config)?;

    let backend: Arc<dyn Backend> = match &config.backend {
        BackendConfig::Flat { path } => {
            let backend = FlatBackend::new(path.clone()).await?;
            Arc::new(backend)
        }
        BackendConfig::Sqlite {
            path,
            max_connections,
        } => {
            let backend = SqliteBackend::new(path, *max_connections).await?;
            Arc::new(backend)
        }
    };

    backend.health_check().await?;
    tracing::info!(
        backend = backend.backend_name(),
        timeout_ms = config.op_timeout_ms,
        "storage backend ready"
    );

    Ok(Arc::new(TimedBackend::new(backend, config.op_timeout())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use updraft_core::config::StoreConfig;

    #[tokio::test]
    async fn test_from_config_flat_memory() {
        let store = from_config(&StoreConfig::for_testing()).await.unwrap();
        store
            .create_record_if_absent("accounts", "x", json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(store.backend_name(), "flat");
    }

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::for_testing();
        config.backend = BackendConfig::Sqlite {
            path: temp.path().join("updraft.db"),
            max_connections: 1,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn test_from_config_rejects_zero_timeout() {
        let mut config = StoreConfig::for_testing();
        config.op_timeout_ms = 0;
        match from_config(&config).await {
            Err(BackendError::Config(_)) => {}
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
