//! Per-request authorization gate.
//!
//! Classify the path, verify the session credential, re-check approval, check
//! the route's role requirement, then admit with a [`PrincipalContext`]. Each
//! step runs only if the previous one passed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use rostergate_auth::{Principal, Protection, RouteTable, authorize_roles, roles::format_roles};
use rostergate_infra::{ApprovalGate, SessionVerifier};

use crate::app::cookies::session_credential;
use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, RemoteOrigin};

/// Prefix of identity headers a client must never be able to inject.
const IDENTITY_HEADER_PREFIX: &str = "x-user-";

#[derive(Clone)]
pub struct AuthState {
    pub routes: Arc<RouteTable>,
    pub verifier: SessionVerifier,
    pub gate: ApprovalGate,
    /// Use `X-Forwarded-For` as the remote origin instead of the peer address.
    pub trust_forwarded_for: bool,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    strip_identity_headers(req.headers_mut());
    let remote = remote_origin(&req, state.trust_forwarded_for);
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(remote.clone());

    // CLASSIFY
    let protection = state.routes.classify(&path).protection.clone();
    if protection == Protection::Public {
        return next.run(req).await;
    }

    // VERIFY_SESSION
    let jar = CookieJar::from_headers(req.headers());
    let credential = session_credential(&jar);
    let identity = match state.verifier.verify(credential.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            let err = ApiError::from(e);
            warn!(path = %path, remote = %remote, code = err.code(), "request rejected: session");
            return err.into_response();
        }
    };

    // CHECK_APPROVAL
    let account = match state.gate.current_account(&identity.subject).await {
        Ok(account) => account,
        Err(e) => {
            let err = match ApiError::from(e) {
                ApiError::AccountNotFound => ApiError::UnknownAccount,
                other => other,
            };
            warn!(
                path = %path,
                subject = %identity.subject,
                remote = %remote,
                code = err.code(),
                "request rejected: approval"
            );
            return err.into_response();
        }
    };
    if let Err(denied) = account.ensure_approved() {
        let err = ApiError::from(denied);
        warn!(
            path = %path,
            subject = %identity.subject,
            actual_roles = %format_roles(&account.roles),
            approval_status = %account.approval_status,
            remote = %remote,
            code = err.code(),
            "request rejected: approval"
        );
        return err.into_response();
    }

    // CHECK_ROLE
    let principal = Principal::from_account(&account);
    if let Protection::Roles(required) = &protection {
        if let Err(denied) = authorize_roles(&principal, required) {
            warn!(
                path = %path,
                subject = %principal.user_id,
                required_roles = %format_roles(required),
                actual_roles = %format_roles(&principal.roles),
                remote = %remote,
                code = "forbidden",
                "request rejected: role"
            );
            return ApiError::from(denied).into_response();
        }
    }

    // ADMIT
    debug!(path = %path, subject = %principal.user_id, "request admitted");
    req.extensions_mut().insert(PrincipalContext::new(principal));
    next.run(req).await
}

fn strip_identity_headers(headers: &mut HeaderMap) {
    let injected: Vec<_> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(IDENTITY_HEADER_PREFIX))
        .cloned()
        .collect();
    for name in injected {
        headers.remove(&name);
    }
}

/// Peer address of the connection. The client-controlled `X-Forwarded-For`
/// header is only consulted when a trusted proxy sets it.
fn remote_origin(req: &Request<Body>, trust_forwarded_for: bool) -> RemoteOrigin {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return RemoteOrigin(addr.to_string());
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| RemoteOrigin(addr.to_string()))
        .unwrap_or_else(RemoteOrigin::unknown)
}
