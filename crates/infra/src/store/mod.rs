//! Document store contract.
//!
//! Single-document reads and writes are atomic; multi-document writes go
//! through [`WriteBatch`], which commits all-or-nothing.

use async_trait::async_trait;
use thiserror::Error;

use rostergate_auth::{Account, ApprovalStatus, Role, RoleAssignment};
use rostergate_core::UserId;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDocumentStore;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// Read-modify-commit attempts before a version conflict is surfaced.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("write conflict on {0}")]
    Conflict(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict(_) => "conflict",
            StoreError::AlreadyExists(_) => "conflict",
            StoreError::Storage(_) => "internal_error",
        }
    }
}

/// Filtered, keyset-paginated account listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountQuery {
    pub status: Option<ApprovalStatus>,
    pub role: Option<Role>,
    pub page_size: usize,
    /// Uid of the last account of the previous page.
    pub page_token: Option<String>,
}

impl Default for AccountQuery {
    fn default() -> Self {
        Self {
            status: None,
            role: None,
            page_size: DEFAULT_PAGE_SIZE,
            page_token: None,
        }
    }
}

impl AccountQuery {
    pub fn matches(&self, account: &Account) -> bool {
        self.status.is_none_or(|s| account.approval_status == s)
            && self.role.is_none_or(|r| account.roles.contains(&r))
    }

    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    pub next_page_token: Option<String>,
    /// Number of accounts matching the filters, across all pages.
    pub total: usize,
}

/// Which assignment records to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssignmentFilter {
    pub role: Option<Role>,
    pub active_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Create an account document; the batch fails with `AlreadyExists` if
    /// the uid or email is taken.
    InsertAccount(Account),
    /// Write an account document. With `expected_version`, the write only
    /// applies if the stored version still equals it.
    PutAccount {
        account: Account,
        expected_version: Option<u64>,
    },
    PutAssignment(RoleAssignment),
}

/// Multi-document write committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `account` guarded by the version it was read at.
    pub fn put_account(&mut self, account: Account) -> &mut Self {
        let expected_version = Some(account.version);
        self.ops.push(WriteOp::PutAccount {
            account,
            expected_version,
        });
        self
    }

    pub fn insert_account(&mut self, account: Account) -> &mut Self {
        self.ops.push(WriteOp::InsertAccount(account));
        self
    }

    pub fn put_assignment(&mut self, assignment: RoleAssignment) -> &mut Self {
        self.ops.push(WriteOp::PutAssignment(assignment));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_account(&self, uid: &UserId) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Create a new account document; fails if the uid or email is taken.
    async fn insert_account(&self, account: Account) -> Result<Account, StoreError>;

    async fn query_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError>;

    async fn assignments_for(
        &self,
        user: &UserId,
        filter: AssignmentFilter,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    /// Apply every write in `batch` or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Password credential held for the local identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub subject: UserId,
    /// Lowercase.
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
}

/// Identity-provider state: password hashes and the per-subject revocation
/// generation. Implemented by the same backends as [`DocumentStore`] so both
/// survive a restart together.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>, StoreError>;

    /// Fails with `AlreadyExists` if the subject or email is taken.
    async fn insert_credential(&self, credential: StoredCredential) -> Result<(), StoreError>;

    async fn delete_credential(&self, subject: &UserId) -> Result<(), StoreError>;

    /// Current generation; 0 for a subject never revoked.
    async fn token_generation(&self, subject: &UserId) -> Result<u64, StoreError>;

    /// Increment the generation and return the new value.
    async fn bump_token_generation(&self, subject: &UserId) -> Result<u64, StoreError>;
}
