//! App records.

use crate::id::{AccountId, AppId, TenantId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An application that receives over-the-air updates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct App {
    /// App identifier.
    pub id: AppId,
    /// App name, unique per owner by convention (not enforced here).
    pub name: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Optional tenant the app belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// When the app was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_time: OffsetDateTime,
}

impl App {
    /// Create a new app with a generated id.
    pub fn new(
        name: impl Into<String>,
        account_id: AccountId,
        tenant_id: Option<TenantId>,
    ) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::MissingField("name"));
        }
        Ok(Self {
            id: AppId::new(),
            name,
            account_id,
            tenant_id,
            created_time: OffsetDateTime::now_utc(),
        })
    }
}
