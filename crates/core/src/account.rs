//! Accounts, tenants, and per-app collaborators.

use crate::id::{AccountId, AppId, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Normalize an email address for indexing: trimmed and lowercased.
///
/// All uniqueness checks and secondary lookups go through the normalized
/// form, so `User@X.com` and `user@x.com` are the same account.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> crate::Result<String> {
    let normalized = normalize_email(email);
    if normalized.is_empty() {
        return Err(crate::Error::MissingField("email"));
    }
    // Minimal shape check; real mailbox validation belongs to the caller.
    let Some((local, domain)) = normalized.split_once('@') else {
        return Err(crate::Error::InvalidEmail(normalized));
    };
    if local.is_empty() || domain.is_empty() || domain.split('.').any(str::is_empty) {
        return Err(crate::Error::InvalidEmail(normalized));
    }
    Ok(normalized)
}

/// An account that owns apps and access keys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,
    /// Email address, normalized; unique across all accounts.
    pub email: String,
    /// Display name.
    pub name: String,
    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl Account {
    /// Create a new account with a generated id.
    ///
    /// Validates the email shape and normalizes it; the caller still has to
    /// reserve the email pointer before the record becomes visible.
    pub fn new(email: impl AsRef<str>, name: impl Into<String>) -> crate::Result<Self> {
        let email = validate_email(email.as_ref())?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::MissingField("name"));
        }
        Ok(Self {
            id: AccountId::new(),
            email,
            name,
            created_time: OffsetDateTime::now_utc(),
        })
    }
}

/// A tenant (organization) grouping apps under shared ownership.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Human-readable organization name.
    pub display_name: String,
    /// Account that created the tenant.
    pub created_by: AccountId,
    /// When the tenant was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl Tenant {
    /// Create a new tenant with a generated id.
    pub fn new(display_name: impl Into<String>, created_by: AccountId) -> crate::Result<Self> {
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(crate::Error::MissingField("display_name"));
        }
        Ok(Self {
            id: TenantId::new(),
            display_name,
            created_by,
            created_time: OffsetDateTime::now_utc(),
        })
    }
}

/// Collaborator permission on an app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Full control, including releasing and deleting deployments.
    Owner,
    /// Can release to existing deployments.
    Collaborator,
}

impl Permission {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "Owner" => Ok(Self::Owner),
            "Collaborator" => Ok(Self::Collaborator),
            _ => Err(crate::Error::InvalidPermission(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Collaborator => "Collaborator",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A collaborator entry linking an account to an app.
///
/// Identified by the compound key `(app_id, email)`. Exactly-one-owner is a
/// policy of the layer above; this record only guarantees the compound key is
/// unique.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collaborator {
    /// App the collaboration applies to.
    pub app_id: AppId,
    /// Collaborator email, normalized.
    pub email: String,
    /// Account behind the email.
    pub account_id: AccountId,
    /// Granted permission.
    pub permission: Permission,
    /// Free-form role label shown in dashboards.
    pub role: String,
}

impl Collaborator {
    /// Create a collaborator entry.
    pub fn new(
        app_id: AppId,
        email: impl AsRef<str>,
        account_id: AccountId,
        permission: Permission,
    ) -> crate::Result<Self> {
        let email = validate_email(email.as_ref())?;
        Ok(Self {
            app_id,
            email,
            account_id,
            permission,
            role: permission.as_str().to_string(),
        })
    }

    /// Primary record key for the compound `(app_id, email)` identity.
    pub fn record_key(app_id: &AppId, email: &str) -> String {
        format!("{app_id}:{}", normalize_email(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn test_account_rejects_bad_email() {
        assert!(Account::new("not-an-email", "X").is_err());
        assert!(Account::new("@x.com", "X").is_err());
        assert!(Account::new("a@", "X").is_err());
        assert!(Account::new("a@b..c", "X").is_err());
        assert!(Account::new("", "X").is_err());
    }

    #[test]
    fn test_account_rejects_empty_name() {
        assert!(Account::new("a@x.com", "  ").is_err());
    }

    #[test]
    fn test_account_normalizes_email() {
        let account = Account::new("User@X.com", "User").unwrap();
        assert_eq!(account.email, "user@x.com");
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(Permission::parse("Owner").unwrap(), Permission::Owner);
        assert_eq!(
            Permission::parse("Collaborator").unwrap(),
            Permission::Collaborator
        );
        assert!(Permission::parse("owner").is_err());
    }

    #[test]
    fn test_collaborator_record_key() {
        let app_id = AppId::new();
        let key = Collaborator::record_key(&app_id, "User@X.com");
        assert_eq!(key, format!("{app_id}:user@x.com"));
    }
}
