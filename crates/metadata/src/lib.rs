//! Metadata store for Updraft: the durable record of accounts, apps,
//! deployments, releases, and access keys behind an over-the-air app-update
//! service.
//!
//! This crate provides the control-plane storage model:
//! - A pointer index emulating secondary lookups (account by email,
//!   deployment by key, account by access-key token) over primary-key-only
//!   backends, with uniqueness and atomic rename
//! - An append-only per-deployment release-history ledger
//! - The storage facade external collaborators call
//!
//! Everything is written against the backend adapter contract in
//! `updraft-storage`; which backend actually runs is decided once, at
//! startup, from configuration.

pub mod error;
pub mod history;
pub mod index;
mod lock;
pub mod pointer;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use history::HistoryLedger;
pub use index::MembershipIndex;
pub use pointer::{Pointer, PointerIndex, PointerKind};
pub use store::{UpdraftStore, collections};

use updraft_core::StoreConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &StoreConfig) -> MetadataResult<UpdraftStore> {
    let backend = updraft_storage::from_config(config).await.map_err(MetadataError::from)?;
    tracing::info!(backend = backend.backend_name(), "metadata store ready");
    Ok(UpdraftStore::new(backend, config.clone()))
}
