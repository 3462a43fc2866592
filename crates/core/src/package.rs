//! Package (release) records and history summaries.

use crate::id::{DeploymentId, PackageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// How a release entered the deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseMethod {
    /// Uploaded directly by a client.
    Upload,
    /// Promoted from another deployment of the same app.
    Promote,
    /// Re-released by a rollback performed above this layer.
    Rollback,
}

impl ReleaseMethod {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "Upload" => Ok(Self::Upload),
            "Promote" => Ok(Self::Promote),
            "Rollback" => Ok(Self::Rollback),
            _ => Err(crate::Error::InvalidReleaseMethod(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Promote => "Promote",
            Self::Rollback => "Rollback",
        }
    }
}

impl fmt::Display for ReleaseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied fields for a new release.
///
/// Everything the store does not generate itself: the binary and manifest
/// live in an external blob service and arrive here as URLs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageFields {
    /// Release label, e.g. "v12".
    pub label: String,
    /// Target app binary version, e.g. "1.4.0".
    pub app_version: String,
    /// Content hash of the update bundle.
    pub package_hash: String,
    /// Where the update bundle is stored.
    pub blob_url: String,
    /// Where the file-level manifest is stored.
    pub manifest_blob_url: String,
    /// Whether clients must install this release.
    pub is_mandatory: bool,
    /// Whether the release is withheld from clients.
    pub is_disabled: bool,
    /// Percentage of clients eligible for this release (1-100).
    pub rollout: u8,
    /// Bundle size in bytes.
    pub size: u64,
    /// Email of the releasing user.
    pub released_by: String,
    /// How the release entered this deployment.
    pub release_method: ReleaseMethod,
    /// Release notes.
    #[serde(default)]
    pub description: String,
}

/// A release, immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Package {
    /// Package identifier.
    pub id: PackageId,
    /// Deployment this release belongs to.
    pub deployment_id: DeploymentId,
    /// When the release was uploaded.
    #[serde(with = "time::serde::rfc3339")]
    pub upload_time: OffsetDateTime,
    #[serde(flatten)]
    pub fields: PackageFields,
}

impl Package {
    /// Create a new package with a generated id.
    ///
    /// Rejects empty labels/versions/hashes and out-of-range rollout before
    /// anything is written.
    pub fn new(deployment_id: DeploymentId, fields: PackageFields) -> crate::Result<Self> {
        if fields.label.trim().is_empty() {
            return Err(crate::Error::MissingField("label"));
        }
        if fields.app_version.trim().is_empty() {
            return Err(crate::Error::MissingField("app_version"));
        }
        if fields.package_hash.trim().is_empty() {
            return Err(crate::Error::MissingField("package_hash"));
        }
        if fields.blob_url.trim().is_empty() {
            return Err(crate::Error::MissingField("blob_url"));
        }
        if fields.rollout == 0 || fields.rollout > crate::MAX_ROLLOUT {
            return Err(crate::Error::InvalidRollout(fields.rollout));
        }
        Ok(Self {
            id: PackageId::new(),
            deployment_id,
            upload_time: OffsetDateTime::now_utc(),
            fields,
        })
    }

    /// The history-ledger entry for this release.
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            package_id: self.id,
            label: self.fields.label.clone(),
            app_version: self.fields.app_version.clone(),
            package_hash: self.fields.package_hash.clone(),
            blob_url: self.fields.blob_url.clone(),
            manifest_blob_url: self.fields.manifest_blob_url.clone(),
            is_mandatory: self.fields.is_mandatory,
            is_disabled: self.fields.is_disabled,
            rollout: self.fields.rollout,
            size: self.fields.size,
            released_by: self.fields.released_by.clone(),
            release_method: self.fields.release_method,
            description: self.fields.description.clone(),
            upload_time: self.upload_time,
        }
    }
}

/// One entry of a deployment's release history.
///
/// A denormalized copy of the package at release time; the ledger is an
/// immutable audit trail, so later edits to anything else never touch it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package_id: PackageId,
    pub label: String,
    pub app_version: String,
    pub package_hash: String,
    pub blob_url: String,
    pub manifest_blob_url: String,
    pub is_mandatory: bool,
    pub is_disabled: bool,
    pub rollout: u8,
    pub size: u64,
    pub released_by: String,
    pub release_method: ReleaseMethod,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_time: OffsetDateTime,
}
