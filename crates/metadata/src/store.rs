//! The storage facade: the single public contract external collaborators
//! call.
//!
//! Every composite operation follows the same discipline: validate input,
//! reserve required pointers, create the primary record, then auxiliary
//! bookkeeping. On any failure after something was created, compensate
//! (release pointers, delete the partial record) before surfacing the error,
//! so failures never leave orphaned pointers behind.

use crate::error::{MetadataError, MetadataResult};
use crate::history::HistoryLedger;
use crate::index::MembershipIndex;
use crate::lock::KeyedLocks;
use crate::pointer::{Pointer, PointerIndex, PointerKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use updraft_core::{
    AccessKey, AccessKeyId, AccessKeyScope, Account, AccountId, App, AppId, Collaborator,
    Deployment, DeploymentId, DeploymentKey, Package, PackageFields, PackageId, PackageSummary,
    Permission, StoreConfig, Tenant, TenantId, normalize_email,
};
use updraft_storage::{Backend, RecordStore, Version};

/// Logical collection names. Backends map these onto their native
/// primitives, but the names and key shapes are fixed so seed/export tooling
/// stays interoperable across backends.
pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    pub const TENANTS: &str = "tenants";
    pub const APPS: &str = "apps";
    pub const COLLABORATORS: &str = "collaborators";
    pub const DEPLOYMENTS: &str = "deployments";
    pub const PACKAGES: &str = "packages";
    pub const ACCESS_KEYS: &str = "accessKeys";

    // Facade-managed bookkeeping; entity collections stay authoritative.
    pub const ACCOUNT_APPS: &str = "accountApps";
    pub const APP_DEPLOYMENTS: &str = "appDeployments";
    pub const APP_COLLABORATORS: &str = "appCollaborators";
    pub const ACCOUNT_ACCESS_KEYS: &str = "accountAccessKeys";
}

use collections::*;

/// Bound on re-reading and re-submitting a version-checked entity update
/// after losing a race.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// The Updraft metadata store.
///
/// Construct once at startup via [`crate::from_config`] (or [`Self::new`]
/// with an explicit backend) and share behind an `Arc`; all operations take
/// `&self` and are safe to call concurrently.
#[derive(Debug)]
pub struct UpdraftStore {
    backend: Arc<dyn Backend>,
    pointers: PointerIndex,
    history: HistoryLedger,
    memberships: MembershipIndex,
    /// Linearizes same-deployment release/rotation record updates in
    /// process; the version checks below still catch writers elsewhere.
    deployment_locks: KeyedLocks,
    config: StoreConfig,
}

impl UpdraftStore {
    /// Create a store over an already-constructed backend.
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        Self {
            pointers: PointerIndex::new(backend.clone()),
            history: HistoryLedger::new(backend.clone(), config.history_append_attempts),
            memberships: MembershipIndex::new(backend.clone()),
            deployment_locks: KeyedLocks::new(),
            backend,
            config,
        }
    }

    /// Name of the backend this store runs on.
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    // ===== Accounts =====

    /// Create an account. Fails `Conflict` if the email is already taken.
    #[instrument(skip_all)]
    pub async fn add_account(&self, email: &str, name: &str) -> MetadataResult<AccountId> {
        let account = Account::new(email, name)?;

        self.pointers
            .reserve(PointerKind::Email, &account.email, &Pointer::to(account.id))
            .await?;

        if let Err(err) = self
            .insert(ACCOUNTS, &account.id.to_string(), &account)
            .await
        {
            self.compensate_release(PointerKind::Email, &account.email).await;
            return Err(err);
        }
        Ok(account.id)
    }

    /// Get an account by id.
    pub async fn get_account(&self, id: &AccountId) -> MetadataResult<Account> {
        let (_, account) = self.fetch(ACCOUNTS, &id.to_string()).await?;
        Ok(account)
    }

    /// Get an account by email.
    pub async fn get_account_by_email(&self, email: &str) -> MetadataResult<Account> {
        let normalized = normalize_email(email);
        let pointer = self
            .pointers
            .resolve(PointerKind::Email, &normalized)
            .await
            .map_err(|err| match err {
                MetadataError::NotFound(_) => {
                    MetadataError::NotFound(format!("account with email '{normalized}'"))
                }
                other => other,
            })?;
        self.fetch_owner(ACCOUNTS, &pointer.owner_id, "account").await
    }

    // ===== Tenants =====

    /// Create a tenant. Fails `NotFound` if the creating account is unknown.
    #[instrument(skip_all, fields(created_by = %created_by))]
    pub async fn add_tenant(
        &self,
        display_name: &str,
        created_by: AccountId,
    ) -> MetadataResult<TenantId> {
        self.get_account(&created_by).await?;
        let tenant = Tenant::new(display_name, created_by)?;
        self.insert(TENANTS, &tenant.id.to_string(), &tenant).await?;
        Ok(tenant.id)
    }

    /// Get a tenant by id.
    pub async fn get_tenant(&self, id: &TenantId) -> MetadataResult<Tenant> {
        let (_, tenant) = self.fetch(TENANTS, &id.to_string()).await?;
        Ok(tenant)
    }

    // ===== Apps =====

    /// Create an app owned by `account_id`, registering the owner as its
    /// first collaborator. Fails `NotFound` if the account (or tenant, when
    /// given) is unknown.
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn add_app(
        &self,
        name: &str,
        account_id: AccountId,
        tenant_id: Option<TenantId>,
    ) -> MetadataResult<AppId> {
        let account = self.get_account(&account_id).await?;
        if let Some(tenant_id) = &tenant_id {
            self.get_tenant(tenant_id).await?;
        }

        let app = App::new(name, account_id, tenant_id)?;
        let app_key = app.id.to_string();
        self.insert(APPS, &app_key, &app).await?;

        let owner =
            Collaborator::new(app.id, &account.email, account_id, Permission::Owner)?;
        let result: MetadataResult<()> = async {
            self.insert(
                COLLABORATORS,
                &Collaborator::record_key(&app.id, &owner.email),
                &owner,
            )
            .await?;
            self.memberships
                .add(APP_COLLABORATORS, &app_key, &owner.email)
                .await?;
            self.memberships
                .add(ACCOUNT_APPS, &account_id.to_string(), &app_key)
                .await?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            self.compensate_delete(COLLABORATORS, &Collaborator::record_key(&app.id, &owner.email))
                .await;
            self.compensate_delete(APPS, &app_key).await;
            return Err(err);
        }
        Ok(app.id)
    }

    /// Get an app by id.
    pub async fn get_app(&self, id: &AppId) -> MetadataResult<App> {
        let (_, app) = self.fetch(APPS, &id.to_string()).await?;
        Ok(app)
    }

    /// Get all apps owned by an account.
    pub async fn get_apps(&self, account_id: &AccountId) -> MetadataResult<Vec<App>> {
        let ids = self
            .memberships
            .list(ACCOUNT_APPS, &account_id.to_string())
            .await?;
        let mut apps = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch::<App>(APPS, &id).await {
                Ok((_, app)) => apps.push(app),
                Err(MetadataError::NotFound(_)) => {
                    tracing::warn!(app_id = %id, "membership names an app that no longer exists");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(apps)
    }

    /// Delete an app together with its deployments and collaborators.
    #[instrument(skip_all, fields(app_id = %id))]
    pub async fn remove_app(&self, id: &AppId) -> MetadataResult<()> {
        let app_key = id.to_string();
        let (_, app) = self.fetch::<App>(APPS, &app_key).await?;

        for deployment_id in self.memberships.list(APP_DEPLOYMENTS, &app_key).await? {
            let deployment_id = DeploymentId::parse(&deployment_id)?;
            match self.delete_deployment(&deployment_id).await {
                Ok(()) | Err(MetadataError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.memberships.clear(APP_DEPLOYMENTS, &app_key).await?;

        for email in self.memberships.list(APP_COLLABORATORS, &app_key).await? {
            match self
                .backend
                .delete_record(COLLABORATORS, &Collaborator::record_key(id, &email))
                .await
            {
                Ok(()) => {}
                Err(updraft_storage::BackendError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.memberships.clear(APP_COLLABORATORS, &app_key).await?;

        self.memberships
            .remove(ACCOUNT_APPS, &app.account_id.to_string(), &app_key)
            .await?;
        self.backend.delete_record(APPS, &app_key).await?;
        Ok(())
    }

    // ===== Collaborators =====

    /// Add a collaborator to an app. Fails `Conflict` if `(app_id, email)` is
    /// already present.
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn add_collaborator(
        &self,
        app_id: AppId,
        email: &str,
        account_id: AccountId,
        permission: Permission,
    ) -> MetadataResult<()> {
        self.get_app(&app_id).await?;
        self.get_account(&account_id).await?;
        let collaborator = Collaborator::new(app_id, email, account_id, permission)?;

        self.insert(
            COLLABORATORS,
            &Collaborator::record_key(&app_id, &collaborator.email),
            &collaborator,
        )
        .await
        .map_err(|err| match err {
            MetadataError::Conflict(_) => MetadataError::Conflict(format!(
                "collaborator '{}' on app {app_id}",
                collaborator.email
            )),
            other => other,
        })?;

        if let Err(err) = self
            .memberships
            .add(APP_COLLABORATORS, &app_id.to_string(), &collaborator.email)
            .await
        {
            self.compensate_delete(
                COLLABORATORS,
                &Collaborator::record_key(&app_id, &collaborator.email),
            )
            .await;
            return Err(err);
        }
        Ok(())
    }

    /// Get all collaborators of an app.
    pub async fn get_collaborators(&self, app_id: &AppId) -> MetadataResult<Vec<Collaborator>> {
        let emails = self
            .memberships
            .list(APP_COLLABORATORS, &app_id.to_string())
            .await?;
        let mut collaborators = Vec::with_capacity(emails.len());
        for email in emails {
            match self
                .fetch::<Collaborator>(COLLABORATORS, &Collaborator::record_key(app_id, &email))
                .await
            {
                Ok((_, collaborator)) => collaborators.push(collaborator),
                Err(MetadataError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(collaborators)
    }

    /// Remove a collaborator from an app.
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn remove_collaborator(&self, app_id: &AppId, email: &str) -> MetadataResult<()> {
        let normalized = normalize_email(email);
        self.backend
            .delete_record(COLLABORATORS, &Collaborator::record_key(app_id, &normalized))
            .await?;
        self.memberships
            .remove(APP_COLLABORATORS, &app_id.to_string(), &normalized)
            .await
    }

    // ===== Deployments =====

    /// Create a deployment with a server-generated key.
    ///
    /// A key-generation collision (astronomically unlikely, but the index
    /// makes it detectable) is retried internally with a fresh key before a
    /// `Conflict` ever surfaces.
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn add_deployment(
        &self,
        app_id: AppId,
        name: &str,
    ) -> MetadataResult<(DeploymentId, DeploymentKey)> {
        self.get_app(&app_id).await?;

        for _attempt in 1..=self.config.key_generation_attempts {
            let deployment = Deployment::new(name, app_id)?;
            let mut pointer = Pointer::to(deployment.id);
            pointer.app_id = Some(app_id.to_string());

            match self
                .pointers
                .reserve(PointerKind::DeploymentKey, deployment.key.as_str(), &pointer)
                .await
            {
                Ok(()) => {}
                Err(MetadataError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }

            let record_key = deployment.id.to_string();
            let result: MetadataResult<()> = async {
                self.insert(DEPLOYMENTS, &record_key, &deployment).await?;
                self.memberships
                    .add(APP_DEPLOYMENTS, &app_id.to_string(), &record_key)
                    .await?;
                Ok(())
            }
            .await;

            if let Err(err) = result {
                self.compensate_delete(DEPLOYMENTS, &record_key).await;
                self.compensate_release(PointerKind::DeploymentKey, deployment.key.as_str())
                    .await;
                return Err(err);
            }
            return Ok((deployment.id, deployment.key));
        }

        Err(MetadataError::Conflict(format!(
            "deployment key generation kept colliding after {} attempts",
            self.config.key_generation_attempts
        )))
    }

    /// Get a deployment by id.
    pub async fn get_deployment(&self, id: &DeploymentId) -> MetadataResult<Deployment> {
        let (_, deployment) = self.fetch(DEPLOYMENTS, &id.to_string()).await?;
        Ok(deployment)
    }

    /// Get all deployments of an app.
    pub async fn get_deployments(&self, app_id: &AppId) -> MetadataResult<Vec<Deployment>> {
        let ids = self
            .memberships
            .list(APP_DEPLOYMENTS, &app_id.to_string())
            .await?;
        let mut deployments = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch::<Deployment>(DEPLOYMENTS, &id).await {
                Ok((_, deployment)) => deployments.push(deployment),
                Err(MetadataError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(deployments)
    }

    /// Get a deployment by its public key.
    pub async fn get_deployment_by_key(&self, key: &str) -> MetadataResult<Deployment> {
        let key = DeploymentKey::parse(key)?;
        let pointer = self
            .pointers
            .resolve(PointerKind::DeploymentKey, key.as_str())
            .await
            .map_err(|err| match err {
                MetadataError::NotFound(_) => {
                    MetadataError::NotFound("deployment for key".to_string())
                }
                other => other,
            })?;
        self.fetch_owner(DEPLOYMENTS, &pointer.owner_id, "deployment").await
    }

    /// Rotate a deployment's key: the old key stops resolving and a fresh
    /// one takes its place, atomically. There is no state in which both or
    /// neither key resolves.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn rotate_deployment_key(&self, id: &DeploymentId) -> MetadataResult<DeploymentKey> {
        let record_key = id.to_string();
        let (mut version, mut deployment) =
            self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await?;
        let old_key = deployment.key.clone();

        let mut pointer = Pointer::to(*id);
        pointer.app_id = Some(deployment.app_id.to_string());

        let mut new_key = None;
        for _attempt in 1..=self.config.key_generation_attempts {
            let candidate = DeploymentKey::generate();
            match self
                .pointers
                .rename(
                    PointerKind::DeploymentKey,
                    old_key.as_str(),
                    candidate.as_str(),
                    &pointer,
                )
                .await
            {
                Ok(()) => {
                    new_key = Some(candidate);
                    break;
                }
                Err(MetadataError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        let Some(new_key) = new_key else {
            return Err(MetadataError::Conflict(format!(
                "deployment key generation kept colliding after {} attempts",
                self.config.key_generation_attempts
            )));
        };

        // Bring the record in line with the index. Concurrent releases may
        // bump the record; re-read and retry rather than clobbering them.
        let _guard = self.deployment_locks.acquire(&record_key).await;
        for _attempt in 1..=MAX_CAS_ATTEMPTS {
            deployment.key = new_key.clone();
            match self
                .replace(DEPLOYMENTS, &record_key, &deployment, version)
                .await
            {
                Ok(_) => return Ok(new_key),
                Err(MetadataError::VersionConflict(_)) => {
                    (version, deployment) =
                        self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await?;
                }
                Err(err) => {
                    self.compensate_rename_back(&new_key, &old_key, &pointer).await;
                    return Err(err);
                }
            }
        }

        self.compensate_rename_back(&new_key, &old_key, &pointer).await;
        Err(MetadataError::VersionConflict(format!(
            "deployment {id} kept changing during key rotation"
        )))
    }

    /// Delete a deployment: releases its key pointer, clears its history,
    /// removes the record. A second call fails `NotFound`.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn delete_deployment(&self, id: &DeploymentId) -> MetadataResult<()> {
        let record_key = id.to_string();
        let (_, deployment) = self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await?;
        let _guard = self.deployment_locks.acquire(&record_key).await;

        // Pointer goes first so the key stops resolving before the entity
        // disappears; every later step is idempotent.
        self.pointers
            .release(PointerKind::DeploymentKey, deployment.key.as_str())
            .await?;
        self.history.clear(id).await?;
        self.memberships
            .remove(APP_DEPLOYMENTS, &deployment.app_id.to_string(), &record_key)
            .await?;
        self.backend.delete_record(DEPLOYMENTS, &record_key).await?;
        Ok(())
    }

    // ===== Packages =====

    /// Release a package to a deployment: stores the immutable package
    /// record, appends it to the deployment's history, and moves
    /// `latest_package_id` to it.
    #[instrument(skip_all, fields(deployment_id = %deployment_id))]
    pub async fn add_package(
        &self,
        deployment_id: &DeploymentId,
        fields: PackageFields,
    ) -> MetadataResult<PackageId> {
        let record_key = deployment_id.to_string();
        self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await?;

        let package = Package::new(*deployment_id, fields)?;
        self.insert(PACKAGES, &package.id.to_string(), &package).await?;

        let _guard = self.deployment_locks.acquire(&record_key).await;

        // Re-read under the lock: the deployment may have been deleted or
        // rotated while the package record was being stored.
        let (mut version, mut deployment) =
            match self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await {
                Ok(pair) => pair,
                Err(err) => {
                    self.compensate_delete(PACKAGES, &package.id.to_string()).await;
                    return Err(err);
                }
            };

        if let Err(err) = self.history.append(deployment_id, package.summary()).await {
            self.compensate_delete(PACKAGES, &package.id.to_string()).await;
            return Err(err);
        }

        // Point the deployment at the new release. Losing a race just means
        // someone else moved the record; re-read and try again.
        for _attempt in 1..=MAX_CAS_ATTEMPTS {
            deployment.latest_package_id = Some(package.id);
            match self
                .replace(DEPLOYMENTS, &record_key, &deployment, version)
                .await
            {
                Ok(_) => return Ok(package.id),
                Err(MetadataError::VersionConflict(_)) => {
                    (version, deployment) =
                        self.fetch::<Deployment>(DEPLOYMENTS, &record_key).await?;
                }
                Err(err) => return Err(err),
            }
        }

        Err(MetadataError::VersionConflict(format!(
            "deployment {deployment_id} kept changing while recording the release"
        )))
    }

    /// Get a package by id.
    pub async fn get_package(&self, id: &PackageId) -> MetadataResult<Package> {
        let (_, package) = self.fetch(PACKAGES, &id.to_string()).await?;
        Ok(package)
    }

    /// Get a deployment's release history, oldest first. A deployment with
    /// no releases (or a deleted one) yields an empty sequence.
    pub async fn get_package_history(
        &self,
        deployment_id: &DeploymentId,
    ) -> MetadataResult<Vec<PackageSummary>> {
        self.history.read_all(deployment_id).await
    }

    /// Get release history by deployment key.
    pub async fn get_package_history_by_key(
        &self,
        key: &str,
    ) -> MetadataResult<Vec<PackageSummary>> {
        let deployment = self.get_deployment_by_key(key).await?;
        self.history.read_all(&deployment.id).await
    }

    // ===== Access keys =====

    /// Create an access key. Fails `Conflict` if the token is already
    /// reserved.
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn add_access_key(
        &self,
        account_id: AccountId,
        name: &str,
        friendly_name: &str,
        created_by: &str,
        expires: OffsetDateTime,
        scope: AccessKeyScope,
    ) -> MetadataResult<AccessKeyId> {
        self.get_account(&account_id).await?;
        let access_key =
            AccessKey::new(account_id, name, friendly_name, created_by, expires, scope)?;

        let mut pointer = Pointer::to(account_id);
        pointer.access_key_id = Some(access_key.id.to_string());
        pointer.expires = Some(expires);
        self.pointers
            .reserve(PointerKind::AccessKey, &access_key.name, &pointer)
            .await
            .map_err(|err| match err {
                MetadataError::Conflict(_) => MetadataError::Conflict(format!(
                    "access key '{}'",
                    access_key.friendly_name
                )),
                other => other,
            })?;

        let result: MetadataResult<()> = async {
            self.insert(ACCESS_KEYS, &access_key.id.to_string(), &access_key)
                .await?;
            self.memberships
                .add(
                    ACCOUNT_ACCESS_KEYS,
                    &account_id.to_string(),
                    &access_key.id.to_string(),
                )
                .await?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            self.compensate_delete(ACCESS_KEYS, &access_key.id.to_string()).await;
            self.compensate_release(PointerKind::AccessKey, &access_key.name).await;
            return Err(err);
        }
        Ok(access_key.id)
    }

    /// Get all access keys of an account.
    pub async fn get_access_keys(&self, account_id: &AccountId) -> MetadataResult<Vec<AccessKey>> {
        let ids = self
            .memberships
            .list(ACCOUNT_ACCESS_KEYS, &account_id.to_string())
            .await?;
        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch::<AccessKey>(ACCESS_KEYS, &id).await {
                Ok((_, key)) => keys.push(key),
                Err(MetadataError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(keys)
    }

    /// Resolve an access-key token to its account.
    ///
    /// Fails `NotFound` for an unknown token and `Expired` for a token whose
    /// expiry is at or before the current instant; the errors are distinct so
    /// callers can tell a stale credential from a bogus one.
    pub async fn get_account_by_access_key(&self, token: &str) -> MetadataResult<Account> {
        let pointer = self
            .pointers
            .resolve(PointerKind::AccessKey, token)
            .await
            .map_err(|err| match err {
                MetadataError::NotFound(_) => {
                    MetadataError::NotFound("account for access key".to_string())
                }
                other => other,
            })?;

        let now = OffsetDateTime::now_utc();
        match &pointer.access_key_id {
            Some(access_key_id) => {
                // The entity record is authoritative for expiry; the pointer
                // only carries a hint.
                let (_, access_key) = self
                    .fetch::<AccessKey>(ACCESS_KEYS, access_key_id)
                    .await
                    .map_err(|err| match err {
                        MetadataError::NotFound(_) => {
                            tracing::warn!("access-key pointer names a record that no longer exists");
                            MetadataError::NotFound("account for access key".to_string())
                        }
                        other => other,
                    })?;
                if access_key.is_expired(now) {
                    return Err(MetadataError::Expired(format!(
                        "access key '{}'",
                        access_key.friendly_name
                    )));
                }
            }
            None => {
                // Pointer written by older tooling; fall back to its hint.
                if let Some(expires) = pointer.expires
                    && expires <= now
                {
                    return Err(MetadataError::Expired("access key".to_string()));
                }
            }
        }

        self.fetch_owner(ACCOUNTS, &pointer.owner_id, "account").await
    }

    /// Remove an access key by token. The token must belong to `account_id`.
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn remove_access_key(
        &self,
        account_id: &AccountId,
        name: &str,
    ) -> MetadataResult<()> {
        let pointer = self
            .pointers
            .resolve(PointerKind::AccessKey, name)
            .await
            .map_err(|err| match err {
                MetadataError::NotFound(_) => {
                    MetadataError::NotFound("access key".to_string())
                }
                other => other,
            })?;
        if pointer.owner_id != account_id.to_string() {
            // Do not reveal that someone else's token exists.
            return Err(MetadataError::NotFound("access key".to_string()));
        }

        self.pointers.release(PointerKind::AccessKey, name).await?;
        if let Some(access_key_id) = &pointer.access_key_id {
            match self.backend.delete_record(ACCESS_KEYS, access_key_id).await {
                Ok(()) => {}
                Err(updraft_storage::BackendError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            self.memberships
                .remove(ACCOUNT_ACCESS_KEYS, &account_id.to_string(), access_key_id)
                .await?;
        }
        Ok(())
    }

    // ===== Internal helpers =====

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> MetadataResult<(Version, T)> {
        let record = self.backend.get_record(collection, key).await?;
        Ok((record.version, serde_json::from_value(record.data)?))
    }

    /// Fetch the entity a pointer resolved to; a dangling pointer is logged
    /// and reported as `NotFound` rather than an internal error, since the
    /// caller's key genuinely resolves to nothing.
    async fn fetch_owner<T: DeserializeOwned>(
        &self,
        collection: &str,
        owner_id: &str,
        what: &'static str,
    ) -> MetadataResult<T> {
        match self.fetch::<T>(collection, owner_id).await {
            Ok((_, entity)) => Ok(entity),
            Err(MetadataError::NotFound(_)) => {
                tracing::warn!(collection, owner_id, "pointer names a record that no longer exists");
                Err(MetadataError::NotFound(what.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn insert<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> MetadataResult<Version> {
        Ok(self
            .backend
            .create_record_if_absent(collection, key, serde_json::to_value(value)?)
            .await?)
    }

    async fn replace<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
        expected: Version,
    ) -> MetadataResult<Version> {
        Ok(self
            .backend
            .put_record(collection, key, serde_json::to_value(value)?, Some(expected))
            .await?)
    }

    /// Best-effort deletion on a compensation path: the original error is
    /// what surfaces, so a failing cleanup is only logged.
    async fn compensate_delete(&self, collection: &str, key: &str) {
        match self.backend.delete_record(collection, key).await {
            Ok(()) => {}
            Err(updraft_storage::BackendError::NotFound(_)) => {}
            Err(err) => {
                tracing::warn!(collection, key, error = %err, "compensating delete failed");
            }
        }
    }

    /// Best-effort pointer release on a compensation path.
    async fn compensate_release(&self, kind: PointerKind, value: &str) {
        if let Err(err) = self.pointers.release(kind, value).await {
            tracing::warn!(kind = %kind, error = %err, "compensating pointer release failed");
        }
    }

    /// Best-effort pointer rename back to the old key after a failed
    /// rotation.
    async fn compensate_rename_back(
        &self,
        from: &DeploymentKey,
        to: &DeploymentKey,
        pointer: &Pointer,
    ) {
        if let Err(err) = self
            .pointers
            .rename(PointerKind::DeploymentKey, from.as_str(), to.as_str(), pointer)
            .await
        {
            tracing::warn!(error = %err, "compensating key-rotation rollback failed");
        }
    }
}
