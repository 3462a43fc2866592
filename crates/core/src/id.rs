//! Entity identifiers.
//!
//! Every entity carries an opaque, globally unique id assigned at creation
//! and never reused. Ids are UUID v4 under the hood but treated as opaque
//! strings by everything above this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a string.
            pub fn parse(s: &str) -> crate::Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| crate::Error::InvalidId(format!("{}: {e}", $label)))
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for an account.
    AccountId,
    "account id"
);

entity_id!(
    /// Unique identifier for a tenant (organization).
    TenantId,
    "tenant id"
);

entity_id!(
    /// Unique identifier for an app.
    AppId,
    "app id"
);

entity_id!(
    /// Unique identifier for a deployment.
    DeploymentId,
    "deployment id"
);

entity_id!(
    /// Unique identifier for a package (release).
    PackageId,
    "package id"
);

entity_id!(
    /// Unique identifier for an access key.
    AccessKeyId,
    "access key id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = AccountId::new();
        let parsed = AccountId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DeploymentId::parse("not-a-uuid").is_err());
        assert!(DeploymentId::parse("").is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(PackageId::new(), PackageId::new());
    }

    #[test]
    fn test_serde_as_string() {
        let id = AppId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: AppId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
