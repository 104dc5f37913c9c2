//! User Directory: registration, visibility-filtered reads, listing and
//! updates, all routed through the access-control rules.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use rostergate_auth::{
    AccessError, Account, AccountPatch, AccountView, ApprovalStatus, InvalidRoles, OwnProfile, Principal,
    Registration, Role, RoleSet, can_access, check_update, sanitize,
};
use rostergate_core::{DomainError, UserId};

use crate::identity::{IdentityError, IdentityProvider};
use crate::roles::stage_roles;
use crate::store::{AccountPage, AccountQuery, AssignmentFilter, DocumentStore, MAX_COMMIT_ATTEMPTS, StoreError, WriteBatch};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Access(#[from] AccessError),

    /// Target missing or not visible to the requester; the two are not distinguished.
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    InvalidRole(#[from] InvalidRoles),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DirectoryError {
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::Validation(_) => "validation_failed",
            DirectoryError::Access(e) => e.code(),
            DirectoryError::NotFound => "not_found",
            DirectoryError::InvalidRole(_) => "invalid_role",
            DirectoryError::Identity(e) => e.code(),
            DirectoryError::Store(e) => e.code(),
        }
    }
}

/// Listing request as received from the caller, before role-based narrowing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub status: Option<String>,
    pub role: Option<String>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub next_page_token: Option<String>,
    pub total: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListing {
    pub users: Vec<AccountView>,
    /// Only present for admin requesters.
    pub pagination: Option<PageInfo>,
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    /// Create credentials and a pending account with the default roles.
    ///
    /// If the account document cannot be written the credentials are removed
    /// again.
    pub async fn register(&self, registration: &Registration) -> Result<Account, DirectoryError> {
        let valid = registration.validate()?;
        if self.store.find_account_by_email(&valid.email).await?.is_some() {
            warn!(email = %valid.email, "registration for an existing email");
            return Err(IdentityError::EmailExists.into());
        }

        let uid = self.provider.create_user(&valid.email, &valid.password).await?;
        let account = Account::register(uid.clone(), &valid, Utc::now());
        match self.store.insert_account(account).await {
            Ok(account) => {
                info!(uid = %uid, "account registered; awaiting approval");
                Ok(account)
            }
            Err(e) => {
                if let Err(cleanup) = self.provider.delete_user(&uid).await {
                    error!(uid = %uid, error = %cleanup, "failed to remove orphaned credentials");
                }
                Err(match e {
                    StoreError::AlreadyExists(_) => IdentityError::EmailExists.into(),
                    other => other.into(),
                })
            }
        }
    }

    /// The requester's own record in the self-view projection.
    pub async fn own_profile(&self, requester: &Principal) -> Result<OwnProfile, DirectoryError> {
        let account = self
            .store
            .get_account(&requester.user_id)
            .await?
            .ok_or(DirectoryError::NotFound)?;
        Ok(OwnProfile::of(account))
    }

    /// Read another account; invisible accounts are reported as `NotFound`.
    pub async fn get_visible(&self, requester: &Principal, uid: &UserId) -> Result<AccountView, DirectoryError> {
        let account = self.store.get_account(uid).await?;
        if !can_access(requester, account.as_ref()) {
            return Err(DirectoryError::NotFound);
        }
        account
            .map(|a| sanitize(a, requester))
            .ok_or(DirectoryError::NotFound)
    }

    /// List accounts. Non-admins only ever see approved accounts, their filters
    /// are ignored and no pagination metadata is returned to them.
    pub async fn list(&self, requester: &Principal, request: ListRequest) -> Result<UserListing, DirectoryError> {
        let admin = requester.is_admin();
        let mut query = AccountQuery {
            page_token: request.page_token.filter(|t| !t.is_empty()),
            ..AccountQuery::default()
        };
        if let Some(size) = request.page_size {
            query.page_size = size;
        }

        if admin {
            query.status = request
                .status
                .as_deref()
                .map(parse_status)
                .transpose()?;
            query.role = request.role.as_deref().map(str::parse::<Role>).transpose()?;
        } else {
            query.status = Some(ApprovalStatus::Approved);
        }

        let AccountPage {
            accounts,
            next_page_token,
            total,
        } = self.store.query_accounts(&query).await?;

        Ok(UserListing {
            users: accounts.into_iter().map(|a| sanitize(a, requester)).collect(),
            pagination: admin.then(|| PageInfo {
                next_page_token,
                total,
                page_size: query.effective_page_size(),
            }),
        })
    }

    /// Apply a patch after the access rules allowed it.
    ///
    /// Admin changes to `roles` are staged with their assignment records in the
    /// same batch as the profile change.
    pub async fn update(
        &self,
        requester: &Principal,
        target: &UserId,
        patch: &AccountPatch,
    ) -> Result<AccountView, DirectoryError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_update(requester, target, patch).await {
                Err(DirectoryError::Store(StoreError::Conflict(msg))) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(user = %target, attempt, %msg, "account update conflicted; retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_update(
        &self,
        requester: &Principal,
        target: &UserId,
        patch: &AccountPatch,
    ) -> Result<AccountView, DirectoryError> {
        // Foreign targets of non-admins are refused without a lookup.
        let account = if requester.is_admin() || requester.is(target) {
            self.store.get_account(target).await?
        } else {
            None
        };
        if let Err(denied) = check_update(requester, target, account.is_some(), patch) {
            warn!(
                requester = %requester.user_id,
                user = %target,
                code = denied.code(),
                "account update denied"
            );
            return Err(denied.into());
        }
        patch.validate()?;
        let mut account = account.ok_or(DirectoryError::NotFound)?;

        if let Some(Some(uid)) = &patch.uid {
            if uid != account.uid.as_str() {
                return Err(DomainError::validation("uid", "cannot be changed").into());
            }
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        account.apply_profile(patch);

        if let Some(Some(names)) = &patch.roles {
            let roles: RoleSet = Role::parse_all(names)?;
            let open = self
                .store
                .assignments_for(
                    target,
                    AssignmentFilter {
                        role: None,
                        active_only: true,
                    },
                )
                .await?;
            stage_roles(target, open, &roles, &requester.user_id, None, now, &mut batch);
            account.roles = roles;
        }
        if let Some(Some(status)) = patch.approval_status {
            if status != account.approval_status {
                match status {
                    ApprovalStatus::Approved => account.approve(&requester.user_id, now),
                    ApprovalStatus::Rejected => account.reject(&requester.user_id, None, now),
                    ApprovalStatus::Pending => account.approval_status = ApprovalStatus::Pending,
                }
            }
        }
        if let Some(Some(verified)) = patch.email_verified {
            account.email_verified = verified;
        }

        account.touch(now);
        batch.put_account(account.clone());
        self.store.commit(batch).await?;
        account.version += 1;

        info!(requester = %requester.user_id, user = %target, "account updated");
        Ok(sanitize(account, requester))
    }

    /// Ensure an approved admin account exists for `email`. Idempotent.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<Account, DirectoryError> {
        let email = email.trim().to_ascii_lowercase();
        if let Some(mut existing) = self.store.find_account_by_email(&email).await? {
            if existing.is_approved() && existing.roles.contains(&Role::Admin) {
                return Ok(existing);
            }
            let now = Utc::now();
            let uid = existing.uid.clone();
            existing.roles.insert(Role::Admin);
            existing.approve(&uid, now);
            let open = self
                .store
                .assignments_for(
                    &uid,
                    AssignmentFilter {
                        role: None,
                        active_only: true,
                    },
                )
                .await?;
            let mut batch = WriteBatch::new();
            let roles = existing.roles.clone();
            stage_roles(&uid, open, &roles, &uid, None, now, &mut batch);
            batch.put_account(existing.clone());
            self.store.commit(batch).await?;
            existing.version += 1;
            info!(uid = %uid, "bootstrap admin promoted");
            return Ok(existing);
        }

        let uid = self.provider.create_user(&email, password).await?;
        let now = Utc::now();
        let mut account = Account {
            display_name: "Administrator".to_string(),
            ..Account::bootstrap(uid.clone(), email, now)
        };
        account.roles = RoleSet::from([Role::Admin]);
        account.approve(&uid, now);

        let mut batch = WriteBatch::new();
        batch.insert_account(account.clone());
        stage_roles(&uid, Vec::new(), &account.roles, &uid, None, now, &mut batch);
        if let Err(e) = self.store.commit(batch).await {
            if let Err(cleanup) = self.provider.delete_user(&uid).await {
                error!(uid = %uid, error = %cleanup, "failed to remove identity after seeding failed");
            }
            return Err(e.into());
        }
        account.version = 1;
        info!(uid = %uid, "bootstrap admin created");
        Ok(account)
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, DirectoryError> {
    match value {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        _ => Err(DomainError::validation("status", "must be one of pending, approved, rejected").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{LocalIdentityConfig, LocalIdentityProvider};
    use crate::store::InMemoryDocumentStore;

    fn directory() -> (UserDirectory, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let provider = Arc::new(LocalIdentityProvider::new(
            LocalIdentityConfig {
                secret: "test-secret".to_string(),
                hash_cost: 4,
            },
            store.clone(),
        ));
        (UserDirectory::new(store.clone(), provider), store)
    }

    fn registration(email: &str, jersey: i64) -> Registration {
        Registration {
            email: email.to_string(),
            password: "secret123".to_string(),
            display_name: Some(format!("Player {jersey}")),
            phone: "9876543210".to_string(),
            jersey_number: Some(jersey),
            date_of_birth: "1990-01-01".to_string(),
        }
    }

    async fn approved(dir: &UserDirectory, store: &InMemoryDocumentStore, email: &str, jersey: i64) -> Account {
        let mut account = dir.register(&registration(email, jersey)).await.unwrap();
        account.approve(&UserId::new("admin"), Utc::now());
        let mut batch = WriteBatch::new();
        batch.put_account(account.clone());
        store.commit(batch).await.unwrap();
        store.get_account(&account.uid).await.unwrap().unwrap()
    }

    fn principal_of(account: &Account) -> Principal {
        Principal::from_account(account)
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (dir, _store) = directory();
        dir.register(&registration("a@example.com", 7)).await.unwrap();
        let err = dir.register(&registration("A@example.com", 8)).await.unwrap_err();
        assert_eq!(err, DirectoryError::Identity(IdentityError::EmailExists));
    }

    #[tokio::test]
    async fn pending_accounts_are_hidden_from_peers() {
        let (dir, store) = directory();
        let viewer = approved(&dir, &store, "v@example.com", 1).await;
        let pending = dir.register(&registration("p@example.com", 2)).await.unwrap();

        let err = dir.get_visible(&principal_of(&viewer), &pending.uid).await.unwrap_err();
        assert_eq!(err, DirectoryError::NotFound);
        assert_eq!(
            dir.get_visible(&principal_of(&viewer), &UserId::new("ghost")).await.unwrap_err(),
            DirectoryError::NotFound
        );
    }

    #[tokio::test]
    async fn non_admin_listing_is_forced_to_approved() {
        let (dir, store) = directory();
        let viewer = approved(&dir, &store, "v@example.com", 1).await;
        dir.register(&registration("p@example.com", 2)).await.unwrap();

        let listing = dir
            .list(
                &principal_of(&viewer),
                ListRequest {
                    status: Some("pending".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listing.users.len(), 1);
        assert!(listing.pagination.is_none());

        let admin = dir.seed_admin("root@example.com", "rootpass").await.unwrap();
        let listing = dir
            .list(
                &principal_of(&admin),
                ListRequest {
                    status: Some("pending".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listing.users.len(), 1);
        assert_eq!(listing.pagination.map(|p| p.total), Some(1));
    }

    #[tokio::test]
    async fn owner_updates_profile_and_updated_at_advances() {
        let (dir, store) = directory();
        let owner = approved(&dir, &store, "o@example.com", 4).await;
        let before = owner.updated_at;
        let patch = AccountPatch {
            jersey_number: Some(23),
            ..Default::default()
        };

        dir.update(&principal_of(&owner), &owner.uid, &patch).await.unwrap();
        let after = store.get_account(&owner.uid).await.unwrap().unwrap();
        assert_eq!(after.jersey_number, Some(23));
        assert!(after.updated_at >= before);
    }

    #[tokio::test]
    async fn foreign_update_is_forbidden_and_leaves_no_trace() {
        let (dir, store) = directory();
        let owner = approved(&dir, &store, "o@example.com", 4).await;
        let other = approved(&dir, &store, "x@example.com", 5).await;
        let patch = AccountPatch {
            jersey_number: Some(23),
            ..Default::default()
        };

        let err = dir.update(&principal_of(&other), &owner.uid, &patch).await.unwrap_err();
        assert_eq!(err, DirectoryError::Access(AccessError::Forbidden));
        assert_eq!(store.get_account(&owner.uid).await.unwrap().unwrap(), owner);
    }

    #[tokio::test]
    async fn admin_role_change_writes_audit_trail() {
        let (dir, store) = directory();
        let admin = dir.seed_admin("root@example.com", "rootpass").await.unwrap();
        let player = approved(&dir, &store, "p@example.com", 9).await;
        let patch = AccountPatch {
            roles: Some(Some(vec!["selector".to_string()])),
            ..Default::default()
        };

        dir.update(&principal_of(&admin), &player.uid, &patch).await.unwrap();
        let records = store
            .assignments_for(&player.uid, AssignmentFilter::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, Role::Selector);
        assert_eq!(
            store.get_account(&player.uid).await.unwrap().unwrap().roles,
            RoleSet::from([Role::Selector])
        );
    }

    #[tokio::test]
    async fn seed_admin_is_idempotent() {
        let (dir, _store) = directory();
        let first = dir.seed_admin("root@example.com", "rootpass").await.unwrap();
        let second = dir.seed_admin("ROOT@example.com", "rootpass").await.unwrap();
        assert_eq!(first.uid, second.uid);
        assert!(second.roles.contains(&Role::Admin));
        assert!(second.is_approved());
    }

    #[tokio::test]
    async fn seeded_admin_has_audit_record_and_survives_restart() {
        let (dir, store) = directory();
        let admin = dir.seed_admin("root@example.com", "rootpass").await.unwrap();
        let records = store.assignments_for(&admin.uid, AssignmentFilter::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, Role::Admin);
        assert_eq!(store.get_account(&admin.uid).await.unwrap().map(|a| a.version), Some(admin.version));

        // fresh provider over the same persisted state
        let provider = Arc::new(LocalIdentityProvider::new(
            LocalIdentityConfig {
                secret: "test-secret".to_string(),
                hash_cost: 4,
            },
            store.clone(),
        ));
        let restarted = UserDirectory::new(store.clone(), provider.clone());
        assert_eq!(restarted.seed_admin("root@example.com", "rootpass").await.unwrap().uid, admin.uid);
        assert!(provider.sign_in_with_password("root@example.com", "rootpass").await.is_ok());
        assert!(matches!(
            restarted.register(&registration("root@example.com", 3)).await,
            Err(DirectoryError::Identity(IdentityError::EmailExists))
        ));
    }
}
