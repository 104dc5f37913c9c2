use serde::Serialize;
use thiserror::Error;

use rostergate_core::UserId;

use crate::RoleSet;

/// Identity decoded from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub subject: UserId,
    pub email: String,
    pub email_verified: bool,
    /// Roles asserted by the provider, if any. Authorization never relies on
    /// this: the account document is the source of truth for roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles_claim: Option<RoleSet>,
}

/// Why a session credential could not be turned into an [`Identity`].
///
/// Each variant has its own stable code; callers log and monitor by code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session credential was presented")]
    MissingCredential,

    #[error("session credential has expired")]
    Expired,

    #[error("session credential is malformed")]
    Malformed,

    #[error("session credential has been revoked")]
    Revoked,

    #[error("session verification failed: {0}")]
    VerificationFailed(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::MissingCredential => "missing_credential",
            SessionError::Expired => "expired",
            SessionError::Malformed => "malformed",
            SessionError::Revoked => "revoked",
            SessionError::VerificationFailed(_) => "verification_failed",
        }
    }
}
