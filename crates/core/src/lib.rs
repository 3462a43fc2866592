//! Core domain types and shared logic for the Updraft metadata store.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Entity identifiers (accounts, apps, deployments, packages, access keys)
//! - Account, tenant, and collaborator records
//! - Deployment records and deployment-key generation
//! - Package (release) records and history summaries
//! - Access keys with expiry and scopes
//! - Store configuration and backend selection

pub mod access_key;
pub mod account;
pub mod app;
pub mod config;
pub mod deployment;
pub mod error;
pub mod id;
pub mod package;

pub use access_key::{AccessKey, AccessKeyScope};
pub use account::{Account, Collaborator, Permission, Tenant, normalize_email};
pub use app::App;
pub use config::{BackendConfig, StoreConfig};
pub use deployment::{Deployment, DeploymentKey};
pub use error::{Error, Result};
pub use id::{AccessKeyId, AccountId, AppId, DeploymentId, PackageId, TenantId};
pub use package::{Package, PackageFields, PackageSummary, ReleaseMethod};

/// Maximum rollout percentage for a release.
pub const MAX_ROLLOUT: u8 = 100;

/// Number of random bytes in a generated deployment key or access-key name.
pub const KEY_SECRET_BYTES: usize = 32;
