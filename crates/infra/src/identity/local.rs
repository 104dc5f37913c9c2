//! Self-contained identity provider: bcrypt password hashes and HS256 tokens.
//!
//! Revocation bumps a per-subject generation counter; every token carries the
//! generation it was minted at and is rejected once the counter moves past it.
//! Hashes and generations are kept in a [`CredentialStore`], so they outlive
//! the process together with the accounts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info};
use uuid::Uuid;

use rostergate_auth::{Identity, SessionClaims, SessionError, TokenKind, validate_claims};
use rostergate_core::UserId;

use super::{IdentityError, IdentityProvider};
use crate::store::{CredentialStore, StoreError, StoredCredential};

/// Id token lifetime: 1 hour.
pub const ID_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct LocalIdentityConfig {
    pub secret: String,
    pub hash_cost: u32,
}

impl LocalIdentityConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

pub struct LocalIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    hash_cost: u32,
    credentials: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for LocalIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentityProvider")
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

fn storage(e: StoreError) -> IdentityError {
    IdentityError::Provider(e.to_string())
}

impl LocalIdentityProvider {
    pub fn new(config: LocalIdentityConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            hash_cost: config.hash_cost,
            credentials,
        }
    }

    fn mint(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| SessionError::VerificationFailed(format!("jwt encode: {e}")))
    }

    /// Signature + time-window check, then kind and revocation checks.
    async fn decode(&self, token: &str, kind: TokenKind, check_revoked: bool) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Malformed,
            })?
            .claims;

        validate_claims(&claims, Utc::now().timestamp()).map_err(|e| {
            debug!(error = %e, "token time window rejected");
            match e {
                rostergate_auth::TokenValidationError::Expired => SessionError::Expired,
                _ => SessionError::Malformed,
            }
        })?;

        if claims.kind != kind {
            return Err(SessionError::Malformed);
        }
        if check_revoked {
            let current = self
                .credentials
                .token_generation(&UserId::new(claims.sub.clone()))
                .await
                .map_err(|e| SessionError::VerificationFailed(e.to_string()))?;
            if claims.generation < current {
                return Err(SessionError::Revoked);
            }
        }
        Ok(claims)
    }

    fn identity(claims: SessionClaims) -> Identity {
        Identity {
            subject: UserId::new(claims.sub),
            email: claims.email,
            email_verified: claims.email_verified,
            roles_claim: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_user(&self, email: &str, password: &str) -> Result<UserId, IdentityError> {
        if password.is_empty() {
            return Err(IdentityError::WeakPassword);
        }
        let email = email.to_ascii_lowercase();
        if self.credentials.find_credential(&email).await.map_err(storage)?.is_some() {
            return Err(IdentityError::EmailExists);
        }

        let cost = self.hash_cost;
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| IdentityError::Provider(format!("hash task: {e}")))?
            .map_err(|e| IdentityError::Provider(format!("bcrypt hash: {e}")))?;

        let subject = UserId::new(Uuid::now_v7().simple().to_string());
        // another registration may have won while hashing
        self.credentials
            .insert_credential(StoredCredential {
                subject: subject.clone(),
                email,
                password_hash,
                email_verified: false,
            })
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => IdentityError::EmailExists,
                other => storage(other),
            })?;
        info!(subject = %subject, "identity created");
        Ok(subject)
    }

    async fn delete_user(&self, subject: &UserId) -> Result<(), IdentityError> {
        self.credentials.delete_credential(subject).await.map_err(storage)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<String, IdentityError> {
        let credential = self
            .credentials
            .find_credential(email)
            .await
            .map_err(storage)?
            .ok_or(IdentityError::InvalidCredentials)?;

        let password = password.to_string();
        let hash = credential.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| IdentityError::Provider(format!("verify task: {e}")))?
            .map_err(|e| IdentityError::Provider(format!("bcrypt verify: {e}")))?;
        if !valid {
            return Err(IdentityError::InvalidCredentials);
        }

        let now = Utc::now().timestamp();
        let generation = self
            .credentials
            .token_generation(&credential.subject)
            .await
            .map_err(storage)?;
        let claims = SessionClaims {
            sub: credential.subject.to_string(),
            email: credential.email,
            email_verified: credential.email_verified,
            kind: TokenKind::IdToken,
            generation,
            iat: now,
            exp: now + ID_TOKEN_TTL_SECS,
        };
        self.mint(&claims).map_err(|e| IdentityError::Provider(e.to_string()))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<Identity, SessionError> {
        self.decode(id_token, TokenKind::IdToken, true).await.map(Self::identity)
    }

    async fn create_session_cookie(&self, id_token: &str, ttl: Duration) -> Result<String, SessionError> {
        let id = self.decode(id_token, TokenKind::IdToken, true).await?;
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            kind: TokenKind::Session,
            iat: now,
            exp: now.saturating_add(ttl),
            ..id
        };
        self.mint(&claims)
    }

    async fn verify_session_cookie(&self, cookie: &str, check_revoked: bool) -> Result<Identity, SessionError> {
        self.decode(cookie, TokenKind::Session, check_revoked)
            .await
            .map(Self::identity)
    }

    async fn revoke_refresh_tokens(&self, subject: &UserId) -> Result<(), IdentityError> {
        let generation = self
            .credentials
            .bump_token_generation(subject)
            .await
            .map_err(storage)?;
        info!(subject = %subject, generation, "tokens revoked");
        Ok(())
    }
}
