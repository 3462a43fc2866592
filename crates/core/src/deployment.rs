//! Deployment records and deployment-key generation.

use crate::id::{AppId, DeploymentId, PackageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// An unguessable public token clients present to identify which
/// deployment's updates they should receive.
///
/// Keys are 32 bytes of OS randomness, base64 URL-safe encoded without
/// padding (43 characters). The key is public but must not be predictable,
/// so generation always goes through the system CSPRNG.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentKey(String);

impl DeploymentKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        use base64::Engine;
        use rand::RngCore;
        let mut bytes = [0u8; crate::KEY_SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a key presented by a client.
    ///
    /// Accepts any non-empty URL-safe token; legacy keys predate the current
    /// fixed-length format, so only the alphabet is enforced.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidKey("empty".to_string()));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::InvalidKey(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeploymentKey({})", self.0)
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named release channel of an app (e.g. "Staging", "Production").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Channel name.
    pub name: String,
    /// Public lookup key; unique across all deployments.
    pub key: DeploymentKey,
    /// Owning app.
    pub app_id: AppId,
    /// The authoritative "current" package, set on every release.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_package_id: Option<PackageId>,
    /// When the deployment was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl Deployment {
    /// Create a new deployment with a generated id and key.
    pub fn new(name: impl Into<String>, app_id: AppId) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::MissingField("name"));
        }
        Ok(Self {
            id: DeploymentId::new(),
            name,
            key: DeploymentKey::generate(),
            app_id,
            latest_package_id: None,
            created_time: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique() {
        let a = DeploymentKey::generate();
        let b = DeploymentKey::generate();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.as_str().len(), 43);
    }

    #[test]
    fn test_parse_accepts_legacy_key() {
        // Shorter key shape used by older releases of the service.
        let key = DeploymentKey::parse("O25dwjupnmTCC-q70qC1CzWfO73NkSR75brivk").unwrap();
        assert_eq!(key.as_str().len(), 38);
    }

    #[test]
    fn test_parse_rejects_bad_alphabet() {
        assert!(DeploymentKey::parse("").is_err());
        assert!(DeploymentKey::parse("has space").is_err());
        assert!(DeploymentKey::parse("semi;colon").is_err());
    }

    #[test]
    fn test_deployment_starts_without_package() {
        let deployment = Deployment::new("Staging", AppId::new()).unwrap();
        assert!(deployment.latest_package_id.is_none());
    }
}
