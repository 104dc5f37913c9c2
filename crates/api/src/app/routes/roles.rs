//! Role assignment and approval decisions (admin routes).
//!
//! The route table already requires the admin role here; handlers still check
//! the specific permission before touching anything.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::{info, warn};

use rostergate_auth::{ApprovalStatus, Permission, authorize};
use rostergate_core::UserId;
use rostergate_infra::Decision;

use crate::app::dto::{
    ApprovalAction, ApprovalRequest, ApprovalResponse, AssignRolesRequest, AssignRolesResponse, RemoveRoleRequest,
    RemoveRoleResponse,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, RemoteOrigin};

fn require(ctx: &PrincipalContext, remote: &RemoteOrigin, permission: Permission) -> Result<(), ApiError> {
    authorize(ctx.principal(), permission).map_err(|e| {
        warn!(
            subject = %ctx.user_id(),
            permission = %permission,
            remote = %remote,
            "permission denied"
        );
        ApiError::from(e)
    })
}

pub async fn assign(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Extension(remote): Extension<RemoteOrigin>,
    payload: Result<Json<AssignRolesRequest>, JsonRejection>,
) -> Result<Json<AssignRolesResponse>, ApiError> {
    require(&ctx, &remote, Permission::ManageRoles)?;
    let Json(body) = payload?;
    if body.user_id.trim().is_empty() {
        return Err(ApiError::validation("userId", "is required"));
    }

    let grant = services
        .roles
        .assign_roles(&UserId::new(body.user_id), body.roles.as_slice(), ctx.user_id(), body.scope)
        .await?;

    Ok(Json(AssignRolesResponse {
        success: true,
        user_id: grant.user_id,
        assigned_roles: grant.roles,
        assignments: grant.assignments,
        timestamp: Utc::now(),
    }))
}

pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Extension(remote): Extension<RemoteOrigin>,
    payload: Result<Json<RemoveRoleRequest>, JsonRejection>,
) -> Result<Json<RemoveRoleResponse>, ApiError> {
    require(&ctx, &remote, Permission::ManageRoles)?;
    let Json(body) = payload?;
    if body.user_id.trim().is_empty() {
        return Err(ApiError::validation("userId", "is required"));
    }

    let user = UserId::new(body.user_id);
    services.roles.remove_role(&user, &body.role, ctx.user_id()).await?;

    Ok(Json(RemoveRoleResponse {
        success: true,
        user_id: user,
        removed_role: body.role,
        timestamp: Utc::now(),
    }))
}

pub async fn decide_approval(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Extension(remote): Extension<RemoteOrigin>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    require(&ctx, &remote, Permission::ManageUsers)?;
    let Json(body) = payload?;
    if body.user_id.trim().is_empty() {
        return Err(ApiError::validation("userId", "is required"));
    }

    let decision = match body.action {
        ApprovalAction::Approve => Decision::Approve,
        ApprovalAction::Reject => Decision::Reject {
            reason: body.reason.filter(|r| !r.trim().is_empty()),
        },
    };
    let target = UserId::new(body.user_id);
    let account = services.approvals.decide(&target, decision, ctx.user_id()).await?;

    let message = match account.approval_status {
        ApprovalStatus::Approved => "User approved",
        _ => "User rejected",
    };
    info!(subject = %ctx.user_id(), user = %target, status = %account.approval_status, "approval decided");
    Ok(Json(ApprovalResponse {
        success: true,
        message: message.to_string(),
        user_id: account.uid,
        approval_status: account.approval_status,
    }))
}
