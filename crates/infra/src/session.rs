//! Session Verifier and the session pipeline built on it.
//!
//! [`SessionVerifier`] turns a credential string into an [`Identity`] or a
//! coded failure. [`SessionManager`] chains it with the Approval Gate for
//! session establishment and for per-request validation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use rostergate_auth::{Account, ApprovalError, Identity, SessionError};
use rostergate_core::UserId;

use crate::approval::{ApprovalGate, GateError};
use crate::identity::{IdentityError, IdentityProvider};
use crate::store::{DocumentStore, StoreError, WriteBatch};

#[derive(Clone)]
pub struct SessionVerifier {
    provider: Arc<dyn IdentityProvider>,
}

impl SessionVerifier {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Verify a session credential, including the revocation check.
    ///
    /// An absent or blank credential is `MissingCredential`, never `Malformed`.
    pub async fn verify(&self, credential: Option<&str>) -> Result<Identity, SessionError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(SessionError::MissingCredential)?;
        self.provider.verify_session_cookie(credential, true).await
    }

    /// Verify an id token presented for session establishment.
    pub async fn verify_id_token(&self, id_token: Option<&str>) -> Result<Identity, SessionError> {
        let id_token = id_token
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(SessionError::MissingCredential)?;
        self.provider.verify_id_token(id_token).await
    }
}

/// Failure of the verify-then-approve pipeline. Later stages never run once an
/// earlier one failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionFlowError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Credentials(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GateError> for SessionFlowError {
    fn from(value: GateError) -> Self {
        match value {
            GateError::Denied(e) => SessionFlowError::Approval(e),
            GateError::UserNotFound => SessionFlowError::Approval(ApprovalError::AccountNotFound),
            GateError::Store(e) => SessionFlowError::Store(e),
        }
    }
}

/// A freshly minted session for an approved account.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub cookie: String,
    pub account: Account,
    pub ttl: Duration,
}

/// Verified and approved requester, re-resolved on every call.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub identity: Identity,
    pub account: Account,
}

#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    verifier: SessionVerifier,
    gate: ApprovalGate,
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self {
            verifier: SessionVerifier::new(provider.clone()),
            gate: ApprovalGate::new(store.clone()),
            provider,
            store,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn verifier(&self) -> &SessionVerifier {
        &self.verifier
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Exchange an id token for a session credential.
    ///
    /// The approval check runs before anything is minted.
    pub async fn establish(&self, id_token: Option<&str>) -> Result<EstablishedSession, SessionFlowError> {
        let identity = self.verifier.verify_id_token(id_token).await?;
        let account = self.gate.check_approval(&identity.subject).await?;
        let token = id_token.map(str::trim).unwrap_or_default();
        let cookie = self.provider.create_session_cookie(token, self.ttl).await?;
        let account = self.record_login(account).await;

        info!(subject = %identity.subject, "session established");
        Ok(EstablishedSession {
            cookie,
            account,
            ttl: self.ttl,
        })
    }

    /// Password sign-in followed by [`SessionManager::establish`].
    pub async fn login(&self, email: &str, password: &str) -> Result<EstablishedSession, SessionFlowError> {
        let id_token = self.provider.sign_in_with_password(email, password).await?;
        self.establish(Some(&id_token)).await
    }

    /// Per-request validation: credential first, then a fresh approval check.
    pub async fn validate(&self, credential: Option<&str>) -> Result<ValidatedSession, SessionFlowError> {
        let identity = self.verifier.verify(credential).await?;
        let account = self.gate.check_approval(&identity.subject).await?;
        Ok(ValidatedSession { identity, account })
    }

    /// Revoke every credential of the session's subject, if it still verifies.
    pub async fn logout(&self, credential: Option<&str>) -> Result<Option<UserId>, SessionFlowError> {
        let identity = match self.verifier.verify(credential).await {
            Ok(identity) => identity,
            Err(e) => {
                info!(code = e.code(), "logout without a valid session");
                return Ok(None);
            }
        };
        self.provider.revoke_refresh_tokens(&identity.subject).await?;
        info!(subject = %identity.subject, "session revoked");
        Ok(Some(identity.subject))
    }

    /// Best effort: a failed `lastLogin` write does not fail the login.
    async fn record_login(&self, mut account: Account) -> Account {
        account.record_login(Utc::now());
        let mut batch = WriteBatch::new();
        batch.put_account(account.clone());
        match self.store.commit(batch).await {
            Ok(()) => account.version += 1,
            Err(e) => warn!(subject = %account.uid, error = %e, "failed to record last login"),
        }
        account
    }
}
