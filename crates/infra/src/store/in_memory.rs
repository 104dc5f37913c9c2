use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use rostergate_auth::{Account, RoleAssignment};
use rostergate_core::{AssignmentId, UserId};

use super::{
    AccountPage, AccountQuery, AssignmentFilter, CredentialStore, DocumentStore, StoreError, StoredCredential,
    WriteBatch, WriteOp,
};

/// In-memory document store for tests/dev.
///
/// A batch is validated in full before anything is written, while holding
/// both write locks, so readers never observe half of a batch.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    accounts: RwLock<BTreeMap<UserId, Account>>,
    assignments: RwLock<BTreeMap<AssignmentId, RoleAssignment>>,
    // keyed by lowercase email
    credentials: RwLock<BTreeMap<String, StoredCredential>>,
    generations: RwLock<BTreeMap<UserId, u64>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_account(&self, uid: &UserId) -> Result<Option<Account>, StoreError> {
        let map = self.accounts.read().map_err(|_| poisoned())?;
        Ok(map.get(uid).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let map = self.accounts.read().map_err(|_| poisoned())?;
        Ok(map.values().find(|a| a.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn insert_account(&self, mut account: Account) -> Result<Account, StoreError> {
        let mut map = self.accounts.write().map_err(|_| poisoned())?;
        if map.contains_key(&account.uid) {
            return Err(StoreError::AlreadyExists(format!("account {}", account.uid)));
        }
        if map.values().any(|a| a.email.eq_ignore_ascii_case(&account.email)) {
            return Err(StoreError::AlreadyExists(format!("email {}", account.email)));
        }
        account.version = 1;
        map.insert(account.uid.clone(), account.clone());
        Ok(account)
    }

    async fn query_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError> {
        let map = self.accounts.read().map_err(|_| poisoned())?;
        let matching: Vec<&Account> = map.values().filter(|a| query.matches(a)).collect();
        let total = matching.len();
        let page_size = query.effective_page_size();

        // BTreeMap iteration is ordered by uid, which is the keyset.
        let mut page: Vec<Account> = matching
            .into_iter()
            .filter(|a| query.page_token.as_deref().is_none_or(|after| a.uid.as_str() > after))
            .take(page_size + 1)
            .cloned()
            .collect();

        let next_page_token = if page.len() > page_size {
            page.truncate(page_size);
            page.last().map(|a| a.uid.to_string())
        } else {
            None
        };

        Ok(AccountPage {
            accounts: page,
            next_page_token,
            total,
        })
    }

    async fn assignments_for(
        &self,
        user: &UserId,
        filter: AssignmentFilter,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let map = self.assignments.read().map_err(|_| poisoned())?;
        let mut records: Vec<RoleAssignment> = map
            .values()
            .filter(|r| &r.user_id == user)
            .filter(|r| filter.role.is_none_or(|role| r.role == role))
            .filter(|r| !filter.active_only || r.is_active())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.valid_from);
        Ok(records)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        let mut assignments = self.assignments.write().map_err(|_| poisoned())?;

        for op in batch.ops() {
            match op {
                WriteOp::PutAccount {
                    account,
                    expected_version: Some(expected),
                } => {
                    let current = accounts.get(&account.uid).map(|a| a.version);
                    if current != Some(*expected) {
                        return Err(StoreError::Conflict(format!(
                            "account {} expected version {expected}, found {current:?}",
                            account.uid
                        )));
                    }
                }
                WriteOp::InsertAccount(account) => {
                    if accounts.contains_key(&account.uid) {
                        return Err(StoreError::AlreadyExists(format!("account {}", account.uid)));
                    }
                    if accounts.values().any(|a| a.email.eq_ignore_ascii_case(&account.email)) {
                        return Err(StoreError::AlreadyExists(format!("email {}", account.email)));
                    }
                }
                _ => {}
            }
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::InsertAccount(mut account) => {
                    account.version = 1;
                    accounts.insert(account.uid.clone(), account);
                }
                WriteOp::PutAccount { mut account, .. } => {
                    let current = accounts.get(&account.uid).map(|a| a.version).unwrap_or(0);
                    account.version = current + 1;
                    accounts.insert(account.uid.clone(), account);
                }
                WriteOp::PutAssignment(record) => {
                    assignments.insert(record.id, record);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryDocumentStore {
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        let map = self.credentials.read().map_err(|_| poisoned())?;
        Ok(map.get(&email.to_ascii_lowercase()).cloned())
    }

    async fn insert_credential(&self, credential: StoredCredential) -> Result<(), StoreError> {
        let mut map = self.credentials.write().map_err(|_| poisoned())?;
        let key = credential.email.to_ascii_lowercase();
        if map.contains_key(&key) || map.values().any(|c| c.subject == credential.subject) {
            return Err(StoreError::AlreadyExists(format!("credential {key}")));
        }
        map.insert(key, credential);
        Ok(())
    }

    async fn delete_credential(&self, subject: &UserId) -> Result<(), StoreError> {
        let mut map = self.credentials.write().map_err(|_| poisoned())?;
        map.retain(|_, c| &c.subject != subject);
        Ok(())
    }

    async fn token_generation(&self, subject: &UserId) -> Result<u64, StoreError> {
        let map = self.generations.read().map_err(|_| poisoned())?;
        Ok(map.get(subject).copied().unwrap_or(0))
    }

    async fn bump_token_generation(&self, subject: &UserId) -> Result<u64, StoreError> {
        let mut map = self.generations.write().map_err(|_| poisoned())?;
        let generation = map.entry(subject.clone()).or_insert(0);
        *generation += 1;
        Ok(*generation)
    }
}
