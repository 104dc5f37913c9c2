//! Registration and session lifecycle endpoints (all public in the route table).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use rostergate_auth::Registration;

use crate::app::cookies::session_credential;
use crate::app::dto::{
    LoginRequest, RegisterResponse, SessionRequest, SessionResponse, SessionUser, VerifyRequest, VerifyResponse,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/session", post(create_session).delete(delete_session))
        .route("/verify", post(verify))
        .route("/logout", post(logout))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(registration) = payload?;
    let account = services.directory.register(&registration).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully. Waiting for admin approval.",
            uid: account.uid,
        }),
    ))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let Json(body) = payload?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::validation("body", "email and password are required"));
    }
    let session = services
        .sessions
        .login(body.email.trim(), &body.password)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            warn!(email = %body.email.trim(), code = err.code(), "login denied");
            err
        })?;

    let jar = jar.add(services.cookies.session_cookie(&session.cookie));
    Ok((
        jar,
        Json(SessionResponse {
            status: "success",
            user: SessionUser::from(&session.account),
        }),
    ))
}

/// Exchange an identity-provider token for a session cookie.
pub async fn create_session(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let Json(body) = payload?;
    let session = services
        .sessions
        .establish(body.token.as_deref())
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            warn!(code = err.code(), "session creation denied");
            err
        })?;

    let jar = jar.add(services.cookies.session_cookie(&session.cookie));
    Ok((
        jar,
        Json(SessionResponse {
            status: "success",
            user: SessionUser::from(&session.account),
        }),
    ))
}

/// Clear the session cookie client-side.
pub async fn delete_session(
    Extension(services): Extension<Arc<AppServices>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.add(services.cookies.cleared_cookie()),
        Json(serde_json::json!({ "status": "success" })),
    )
}

/// Check a session credential on behalf of a caller.
///
/// Failures keep the usual error body and add `"valid": false`.
pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let Json(body) = payload?;
        let session = services.sessions.validate(body.session_cookie.as_deref()).await?;
        Ok::<_, ApiError>(session)
    }
    .await;

    match result {
        Ok(session) => Json(VerifyResponse {
            valid: true,
            user: SessionUser::from(&session.account),
        })
        .into_response(),
        Err(err) => {
            warn!(code = err.code(), "session verification denied");
            let mut body = err.body();
            body["valid"] = serde_json::Value::Bool(false);
            (err.status(), Json(body)).into_response()
        }
    }
}

/// Revoke the subject's credentials and clear the cookie. Always succeeds for
/// the caller; revocation failures are logged.
pub async fn logout(Extension(services): Extension<Arc<AppServices>>, jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let credential = session_credential(&jar);
    match services.sessions.logout(credential.as_deref()).await {
        Ok(Some(subject)) => info!(subject = %subject, "signed out"),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "failed to revoke session on logout"),
    }
    (
        jar.add(services.cookies.cleared_cookie()),
        Json(serde_json::json!({ "success": true })),
    )
}
