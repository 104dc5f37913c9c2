use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rostergate_auth::{Account, ApprovalStatus, AssignmentScope, AccountView, RoleAssignment, RoleSet};
use rostergate_core::UserId;
use rostergate_infra::{PageInfo, UserListing};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default, alias = "idToken")]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub session_cookie: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolesRequest {
    pub user_id: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub scope: Option<AssignmentScope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRoleRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub user_id: String,
    pub action: ApprovalAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsQuery {
    #[serde(default)]
    pub active_only: bool,
}

// -------------------------
// Response DTOs
// -------------------------

/// Identity summary returned by the session endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub uid: UserId,
    pub email: String,
    pub roles: RoleSet,
    pub email_verified: bool,
}

impl From<&Account> for SessionUser {
    fn from(account: &Account) -> Self {
        Self {
            uid: account.uid.clone(),
            email: account.email.clone(),
            roles: account.roles.clone(),
            email_verified: account.email_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub status: &'static str,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: &'static str,
    pub uid: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolesResponse {
    pub success: bool,
    pub user_id: UserId,
    pub assigned_roles: RoleSet,
    pub assignments: Vec<RoleAssignment>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRoleResponse {
    pub success: bool,
    pub user_id: UserId,
    pub removed_role: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub success: bool,
    pub message: String,
    pub user_id: UserId,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDto {
    pub next_page_token: Option<String>,
    pub total: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<AccountView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationDto>,
}

impl From<UserListing> for UserListResponse {
    fn from(listing: UserListing) -> Self {
        Self {
            users: listing.users,
            pagination: listing.pagination.map(
                |PageInfo {
                     next_page_token,
                     total,
                     page_size,
                 }| PaginationDto {
                    next_page_token,
                    total,
                    page_size,
                },
            ),
        }
    }
}
