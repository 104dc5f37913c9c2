//! Approval Gate: only `approved` accounts may establish or use a session.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use rostergate_auth::{Account, ApprovalError};
use rostergate_core::UserId;

use crate::store::{DocumentStore, MAX_COMMIT_ATTEMPTS, StoreError, WriteBatch};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error(transparent)]
    Denied(#[from] ApprovalError),

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admin decision on a pending (or previously decided) account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: Option<String> },
}

#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<dyn DocumentStore>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Fresh read of the account, whatever its approval status.
    pub async fn current_account(&self, subject: &UserId) -> Result<Account, GateError> {
        let account = self
            .store
            .get_account(subject)
            .await?
            .ok_or(ApprovalError::AccountNotFound)?;
        Ok(account)
    }

    /// Fresh read of the account, admitted only if approved.
    pub async fn check_approval(&self, subject: &UserId) -> Result<Account, GateError> {
        let account = self.current_account(subject).await?;
        account.ensure_approved()?;
        Ok(account)
    }

    /// Record an approval decision made by `decided_by`.
    pub async fn decide(&self, target: &UserId, decision: Decision, decided_by: &UserId) -> Result<Account, GateError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut account = self.store.get_account(target).await?.ok_or(GateError::UserNotFound)?;
            let now = Utc::now();
            match &decision {
                Decision::Approve => account.approve(decided_by, now),
                Decision::Reject { reason } => account.reject(decided_by, reason.clone(), now),
            }

            let mut batch = WriteBatch::new();
            batch.put_account(account.clone());
            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(
                        user = %target,
                        decided_by = %decided_by,
                        status = %account.approval_status,
                        "approval decision recorded"
                    );
                    account.version += 1;
                    return Ok(account);
                }
                Err(StoreError::Conflict(msg)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(user = %target, attempt, %msg, "approval decision conflicted; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use rostergate_auth::Registration;

    async fn seeded() -> (ApprovalGate, UserId) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let reg = Registration {
            email: "p@example.com".to_string(),
            password: "secret123".to_string(),
            display_name: None,
            phone: "9876543210".to_string(),
            jersey_number: Some(7),
            date_of_birth: "1990-01-01".to_string(),
        };
        let account = Account::register(UserId::new("p"), &reg.validate().unwrap(), Utc::now());
        store.insert_account(account).await.unwrap();
        (ApprovalGate::new(store), UserId::new("p"))
    }

    #[tokio::test]
    async fn pending_then_approved_then_rejected() {
        let (gate, uid) = seeded().await;
        let admin = UserId::new("admin");

        assert_eq!(
            gate.check_approval(&uid).await,
            Err(GateError::Denied(ApprovalError::AccountPending))
        );

        gate.decide(&uid, Decision::Approve, &admin).await.unwrap();
        assert!(gate.check_approval(&uid).await.is_ok());

        gate.decide(
            &uid,
            Decision::Reject {
                reason: Some("left the club".to_string()),
            },
            &admin,
        )
        .await
        .unwrap();
        assert_eq!(
            gate.check_approval(&uid).await,
            Err(GateError::Denied(ApprovalError::AccountRejected {
                rejection_reason: Some("left the club".to_string())
            }))
        );
    }

    #[tokio::test]
    async fn missing_account_is_reported() {
        let (gate, _) = seeded().await;
        let ghost = UserId::new("ghost");
        assert_eq!(
            gate.check_approval(&ghost).await,
            Err(GateError::Denied(ApprovalError::AccountNotFound))
        );
        assert_eq!(
            gate.decide(&ghost, Decision::Approve, &UserId::new("admin")).await,
            Err(GateError::UserNotFound)
        );
    }
}
