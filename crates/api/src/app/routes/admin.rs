//! Admin-only inspection routes.
//!
//! Mounted under `/api/admin`, which the route table restricts to admins.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{PathRejection, QueryRejection},
    },
    routing::get,
};
use serde::Serialize;

use rostergate_auth::{ApprovalStatus, Permission, Role, RoleAssignment};
use rostergate_core::UserId;
use rostergate_infra::ListRequest;

use crate::app::dto::{AssignmentsQuery, ListUsersQuery, UserListResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Response DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub role: Role,
    pub permissions: &'static [Permission],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentHistory {
    pub user_id: UserId,
    pub assignments: Vec<RoleAssignment>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/approvals", get(pending_approvals))
        .route("/users/:uid/assignments", get(assignments))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/roles - every role with the permissions it grants
pub async fn list_roles() -> Json<Vec<RoleInfo>> {
    Json(
        Role::ALL
            .iter()
            .map(|role| RoleInfo {
                role: *role,
                permissions: role.permissions(),
            })
            .collect(),
    )
}

/// GET /admin/approvals - accounts waiting for a decision
pub async fn pending_approvals(
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
                status: Some(ApprovalStatus::Pending.as_str().to_string()),
                role: q.role,
                page_size: q.page_size,
                page_token: q.page_token,
            },
        )
        .await?;
    Ok(Json(listing.into()))
}

/// GET /admin/users/:uid/assignments - role assignment audit trail
pub async fn assignments(
    Extension(services): Extension<Arc<AppServices>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<AssignmentsQuery>, QueryRejection>,
) -> Result<Json<AssignmentHistory>, ApiError> {
    let Path(uid) = path?;
    let Query(q) = query?;
    let user_id = UserId::new(uid);
    let assignments = services.roles.assignments(&user_id, q.active_only).await?;
    Ok(Json(AssignmentHistory { user_id, assignments }))
}
