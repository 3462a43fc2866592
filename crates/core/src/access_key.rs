//! Access keys: bearer tokens tied to an account.

use crate::id::{AccessKeyId, AccountId};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Access key scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKeyScope {
    /// Full access to everything the account can do.
    All,
    /// Read-only access.
    ReadOnly,
}

impl AccessKeyScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "read_only" => Ok(Self::ReadOnly),
            _ => Err(crate::Error::InvalidScope(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ReadOnly => "read_only",
        }
    }
}

impl fmt::Display for AccessKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An access key granting API access on behalf of an account.
///
/// The `name` is the bearer token itself; it is looked up through the
/// pointer index, never scanned. An expired key stays in storage (so the
/// caller can distinguish "expired" from "never existed") but is inert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessKey {
    /// Access key identifier.
    pub id: AccessKeyId,
    /// Owning account.
    pub account_id: AccountId,
    /// The bearer token; unique across all access keys.
    pub name: String,
    /// Human-readable label ("CI key", "Jane's laptop").
    pub friendly_name: String,
    /// Who issued the key.
    pub created_by: String,
    /// When the key was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
    /// Absolute expiry. A key is expired from this instant onward.
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    /// Granted scope.
    pub scope: AccessKeyScope,
}

impl AccessKey {
    /// Create a new access key with a generated id.
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        created_by: impl Into<String>,
        expires: OffsetDateTime,
        scope: AccessKeyScope,
    ) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::MissingField("name"));
        }
        let friendly_name = friendly_name.into();
        if friendly_name.trim().is_empty() {
            return Err(crate::Error::MissingField("friendly_name"));
        }
        Ok(Self {
            id: AccessKeyId::new(),
            account_id,
            name,
            friendly_name,
            created_by: created_by.into(),
            created_time: OffsetDateTime::now_utc(),
            expires,
            scope,
        })
    }

    /// Generate a random token suitable for use as a key name.
    pub fn generate_name() -> String {
        use base64::Engine;
        use rand::RngCore;
        let mut bytes = [0u8; crate::KEY_SECRET_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Whether the key is expired at `now`. The boundary instant counts as
    /// expired.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn key(expires: OffsetDateTime) -> AccessKey {
        AccessKey::new(
            AccountId::new(),
            AccessKey::generate_name(),
            "Default Access Key",
            "admin",
            expires,
            AccessKeyScope::All,
        )
        .unwrap()
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let now = OffsetDateTime::now_utc();
        assert!(key(now).is_expired(now));
        assert!(key(now - Duration::seconds(1)).is_expired(now));
        assert!(!key(now + Duration::seconds(1)).is_expired(now));
    }

    #[test]
    fn test_requires_names() {
        let expires = OffsetDateTime::now_utc();
        assert!(
            AccessKey::new(AccountId::new(), "", "x", "admin", expires, AccessKeyScope::All)
                .is_err()
        );
        assert!(
            AccessKey::new(AccountId::new(), "tok", "", "admin", expires, AccessKeyScope::All)
                .is_err()
        );
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(AccessKeyScope::parse("all").unwrap(), AccessKeyScope::All);
        assert_eq!(
            AccessKeyScope::parse("read_only").unwrap(),
            AccessKeyScope::ReadOnly
        );
        assert!(AccessKeyScope::parse("admin").is_err());
    }
}
