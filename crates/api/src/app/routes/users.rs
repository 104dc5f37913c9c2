//! Profile and user directory endpoints (authenticated).

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use tracing::{info, warn};

use rostergate_auth::roles::format_roles;
use rostergate_auth::{AccessError, AccountPatch, AccountView, OwnProfile};
use rostergate_core::UserId;
use rostergate_infra::{DirectoryError, ListRequest};

use crate::app::dto::{ListUsersQuery, UserListResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, RemoteOrigin};

/// The caller's own record, without `roles` or `emailVerified`.
pub async fn own_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Result<Json<OwnProfile>, ApiError> {
    let profile = services.directory.own_profile(ctx.principal()).await?;
    Ok(Json(profile))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<UserListResponse>, ApiError> {
    let Query(q) = query?;
    let listing = services
        .directory
        .list(
            ctx.principal(),
            ListRequest {
                status: q.status,
                role: q.role,
                page_size: q.page_size,
                page_token: q.page_token,
            },
        )
        .await?;
    Ok(Json(listing.into()))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Extension(remote): Extension<RemoteOrigin>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<AccountView>, ApiError> {
    let Path(uid) = path?;
    let uid = UserId::new(uid);
    match services.directory.get_visible(ctx.principal(), &uid).await {
        Ok(view) => Ok(Json(view)),
        Err(DirectoryError::NotFound) => {
            warn!(subject = %ctx.user_id(), user = %uid, remote = %remote, "account not visible to requester");
            Err(ApiError::NotFound)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Extension(remote): Extension<RemoteOrigin>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<AccountPatch>, JsonRejection>,
) -> Result<Json<AccountView>, ApiError> {
    let Path(uid) = path?;
    let uid = UserId::new(uid);

    // ownership first, so a foreign body is never inspected
    let requester = ctx.principal();
    if !requester.is_admin() && !requester.is(&uid) {
        warn!(
            subject = %ctx.user_id(),
            user = %uid,
            actual_roles = %format_roles(ctx.roles()),
            remote = %remote,
            code = "forbidden",
            "profile update denied"
        );
        return Err(AccessError::Forbidden.into());
    }
    let Json(patch) = payload?;

    let view = services
        .directory
        .update(ctx.principal(), &uid, &patch)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            if matches!(err, ApiError::Forbidden(_) | ApiError::UnauthorizedFields(_)) {
                warn!(
                    subject = %ctx.user_id(),
                    user = %uid,
                    remote = %remote,
                    code = err.code(),
                    "profile update denied"
                );
            }
            err
        })?;

    info!(subject = %ctx.user_id(), user = %uid, "profile updated");
    Ok(Json(view))
}
