use serde::Serialize;

use rostergate_core::UserId;

use crate::{Account, Permission, Role, RoleSet};

/// A fully resolved, approved requester.
///
/// Built from a fresh account read on every request, so `roles` reflects the
/// document store at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub roles: RoleSet,
}

impl Principal {
    pub fn from_account(account: &Account) -> Self {
        Self {
            user_id: account.uid.clone(),
            email: account.email.clone(),
            roles: account.roles.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn is(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.roles.iter().any(|r| r.permissions().contains(&permission))
    }
}
