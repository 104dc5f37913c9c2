//! Translation of domain/service failures into HTTP responses.
//!
//! This is the only place where error kinds become status codes. Every body is
//! `{"error": <code>, "message": ...}`, plus `details`, `reason` or
//! `rejectionReason` where relevant.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use rostergate_auth::{AccessError, ApprovalError, AuthzError, InvalidRoles, SessionError};
use rostergate_core::{DomainError, FieldProblem};
use rostergate_infra::{DirectoryError, GateError, IdentityError, RoleError, SessionFlowError, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("authentication required")]
    MissingCredential,

    /// Presented credential could not be verified; `reason` is the verifier code.
    #[error("invalid or expired session")]
    InvalidSession { reason: &'static str },

    #[error("invalid email or password")]
    InvalidCredentials,

    /// Verified subject without an account record, seen by the middleware.
    #[error("no account for this session")]
    UnknownAccount,

    #[error("account not found")]
    AccountNotFound,

    #[error("account is pending approval")]
    AccountPending,

    #[error("account has been rejected")]
    AccountRejected { rejection_reason: Option<String> },

    #[error("{0}")]
    Forbidden(String),

    #[error("not allowed to update fields: {}", .0.join(", "))]
    UnauthorizedFields(Vec<String>),

    #[error("request validation failed")]
    Validation(Vec<FieldProblem>),

    #[error("invalid roles: {}", .0.join(", "))]
    InvalidRole(Vec<String>),

    #[error("user not found")]
    UserNotFound,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingCredential => "auth_missing_credential",
            ApiError::InvalidSession { .. } | ApiError::InvalidCredentials => "auth_invalid_or_expired",
            ApiError::UnknownAccount | ApiError::AccountNotFound => "account_not_found",
            ApiError::AccountPending => "account_pending",
            ApiError::AccountRejected { .. } => "account_rejected",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::UnauthorizedFields(_) => "unauthorized_fields",
            ApiError::Validation(_) => "validation_failed",
            ApiError::InvalidRole(_) => "invalid_role",
            ApiError::UserNotFound => "user_not_found",
            ApiError::NotFound => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCredential
            | ApiError::InvalidSession { .. }
            | ApiError::InvalidCredentials
            | ApiError::UnknownAccount => StatusCode::UNAUTHORIZED,
            ApiError::AccountPending
            | ApiError::AccountRejected { .. }
            | ApiError::Forbidden(_)
            | ApiError::UnauthorizedFields(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            ApiError::AccountNotFound | ApiError::UserNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("forbidden".to_string())
    }

    pub fn validation(field: &str, message: &str) -> Self {
        ApiError::Validation(vec![FieldProblem::new(field, message)])
    }

    /// JSON body; internal detail is never echoed to the caller.
    pub fn body(&self) -> Value {
        let message = match self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let mut body = json!({ "error": self.code(), "message": message });
        match self {
            ApiError::InvalidSession { reason } => {
                body["reason"] = json!(reason);
            }
            ApiError::AccountRejected {
                rejection_reason: Some(reason),
            } => {
                body["rejectionReason"] = json!(reason);
            }
            ApiError::Validation(problems) => {
                body["details"] = json!(problems);
            }
            ApiError::InvalidRole(offenders) => {
                body["details"] = json!(offenders
                    .iter()
                    .map(|o| FieldProblem::new("roles", format!("unknown role '{o}'")))
                    .collect::<Vec<_>>());
            }
            ApiError::UnauthorizedFields(fields) => {
                body["details"] = json!(fields
                    .iter()
                    .map(|f| FieldProblem::new(f.as_str(), "may only be changed by an administrator"))
                    .collect::<Vec<_>>());
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!(code = self.code(), detail = %detail, "request failed");
        }
        (self.status(), axum::Json(self.body())).into_response()
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl From<SessionError> for ApiError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::MissingCredential => ApiError::MissingCredential,
            SessionError::VerificationFailed(detail) => {
                error!(%detail, "session verification failed");
                ApiError::InvalidSession {
                    reason: "verification_failed",
                }
            }
            other => ApiError::InvalidSession { reason: other.code() },
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(value: ApprovalError) -> Self {
        match value {
            ApprovalError::AccountNotFound => ApiError::AccountNotFound,
            ApprovalError::AccountPending => ApiError::AccountPending,
            ApprovalError::AccountRejected { rejection_reason } => ApiError::AccountRejected { rejection_reason },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) | StoreError::AlreadyExists(msg) => ApiError::Conflict(msg),
            StoreError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::EmailExists => ApiError::Conflict("email address is already registered".to_string()),
            IdentityError::InvalidCredentials => ApiError::InvalidCredentials,
            IdentityError::WeakPassword => ApiError::validation("password", "password is too weak"),
            IdentityError::UnknownSubject(_) => ApiError::UserNotFound,
            IdentityError::Provider(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SessionFlowError> for ApiError {
    fn from(value: SessionFlowError) -> Self {
        match value {
            SessionFlowError::Session(e) => e.into(),
            SessionFlowError::Approval(e) => e.into(),
            SessionFlowError::Credentials(e) => e.into(),
            SessionFlowError::Store(e) => e.into(),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(value: GateError) -> Self {
        match value {
            GateError::Denied(e) => e.into(),
            GateError::UserNotFound => ApiError::UserNotFound,
            GateError::Store(e) => e.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(problems) => ApiError::Validation(problems),
            DomainError::InvalidId(msg) => ApiError::validation("id", &msg),
            DomainError::InvariantViolation(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<InvalidRoles> for ApiError {
    fn from(value: InvalidRoles) -> Self {
        ApiError::InvalidRole(value.offenders)
    }
}

impl From<AccessError> for ApiError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::Forbidden => ApiError::forbidden(),
            AccessError::UnauthorizedFields(fields) => ApiError::UnauthorizedFields(fields),
            AccessError::UserNotFound => ApiError::UserNotFound,
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        ApiError::Forbidden(value.to_string())
    }
}

impl From<RoleError> for ApiError {
    fn from(value: RoleError) -> Self {
        match value {
            RoleError::InvalidRole(e) => e.into(),
            RoleError::UserNotFound => ApiError::UserNotFound,
            RoleError::Validation(e) => e.into(),
            RoleError::Store(e) => e.into(),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::Validation(e) => e.into(),
            DirectoryError::Access(e) => e.into(),
            DirectoryError::NotFound => ApiError::NotFound,
            DirectoryError::InvalidRole(e) => e.into(),
            DirectoryError::Identity(e) => e.into(),
            DirectoryError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::validation("body", &value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::validation("query", &value.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        ApiError::validation("path", &value.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_failures_keep_distinct_reasons() {
        let expired: ApiError = SessionError::Expired.into();
        let revoked: ApiError = SessionError::Revoked.into();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.body()["reason"], "expired");
        assert_eq!(revoked.body()["reason"], "revoked");
        assert_eq!(ApiError::from(SessionError::MissingCredential).code(), "auth_missing_credential");
    }

    #[test]
    fn validation_carries_details() {
        let err: ApiError = DomainError::validation("jerseyNumber", "must be between 1 and 99").into();
        let body = err.body();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["details"][0]["field"], "jerseyNumber");
    }

    #[test]
    fn rejected_accounts_expose_reason() {
        let err: ApiError = ApprovalError::AccountRejected {
            rejection_reason: Some("duplicate".to_string()),
        }
        .into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.body()["rejectionReason"], "duplicate");
    }

    #[test]
    fn internal_detail_is_not_echoed() {
        let err = ApiError::Internal("db password wrong".to_string());
        assert_eq!(err.body()["message"], "internal server error");
    }
}
