use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which kind of credential a set of claims was minted for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived token returned by a password sign-in, exchanged for a session.
    IdToken,
    /// Long-lived session credential carried in the `session` cookie.
    Session,
}

/// Claims carried by every signed credential (transport-agnostic).
///
/// Timestamps are unix seconds so the struct maps directly onto a JWT body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (account uid).
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    pub kind: TokenKind,
    /// Revocation generation of the subject at mint time.
    pub generation: u64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claims' time window against `now` (unix seconds).
///
/// Signature verification happens in the identity provider, not here.
pub fn validate_claims(claims: &SessionClaims, now: i64) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: "u1".to_string(),
            email: "u1@example.com".to_string(),
            email_verified: false,
            kind: TokenKind::Session,
            generation: 0,
            iat,
            exp,
        }
    }

    #[test]
    fn time_window_checks() {
        assert_eq!(validate_claims(&claims(100, 100), 100), Err(TokenValidationError::InvalidTimeWindow));
        assert_eq!(validate_claims(&claims(100, 200), 50), Err(TokenValidationError::NotYetValid));
        assert_eq!(validate_claims(&claims(100, 200), 200), Err(TokenValidationError::Expired));
        assert_eq!(validate_claims(&claims(100, 200), 150), Ok(()));
    }
}
