//! Identity provider contract: credentials, token minting and verification.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use rostergate_auth::{Identity, SessionError};
use rostergate_core::UserId;

pub mod local;

pub use local::{LocalIdentityProvider, LocalIdentityConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("email address is already registered")]
    EmailExists,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("password is too weak")]
    WeakPassword,

    #[error("unknown subject: {0}")]
    UnknownSubject(UserId),

    #[error("identity provider error: {0}")]
    Provider(String),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::EmailExists => "conflict",
            IdentityError::InvalidCredentials => "auth_invalid_or_expired",
            IdentityError::WeakPassword => "validation_failed",
            IdentityError::UnknownSubject(_) => "user_not_found",
            IdentityError::Provider(_) => "internal_error",
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register credentials and return the provider-issued subject id.
    async fn create_user(&self, email: &str, password: &str) -> Result<UserId, IdentityError>;

    /// Remove credentials (compensates a registration whose account write failed).
    async fn delete_user(&self, subject: &UserId) -> Result<(), IdentityError>;

    /// Exchange email + password for a short-lived id token.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<String, IdentityError>;

    async fn verify_id_token(&self, id_token: &str) -> Result<Identity, SessionError>;

    /// Mint a session credential from a valid id token.
    async fn create_session_cookie(&self, id_token: &str, ttl: Duration) -> Result<String, SessionError>;

    async fn verify_session_cookie(&self, cookie: &str, check_revoked: bool) -> Result<Identity, SessionError>;

    /// Invalidate every credential issued to `subject` so far.
    async fn revoke_refresh_tokens(&self, subject: &UserId) -> Result<(), IdentityError>;
}
