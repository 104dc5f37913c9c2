use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rostergate_core::{AssignmentId, UserId};

use crate::{Permission, Role};

/// Optional narrowing of a role grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournaments: Option<Vec<String>>,
}

/// Audit record of a role grant.
///
/// For a given `(user_id, role)` at most one record is open (`valid_until` is
/// `None`). Records are closed, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub id: AssignmentId,
    pub user_id: UserId,
    pub role: Role,
    pub assigned_by: UserId,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<AssignmentScope>,
}

impl RoleAssignment {
    pub fn open(
        user_id: UserId,
        role: Role,
        assigned_by: UserId,
        scope: Option<AssignmentScope>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            user_id,
            role,
            assigned_by,
            valid_from: now,
            valid_until: None,
            permissions: role.permissions().to_vec(),
            scope,
        }
    }

    pub fn is_active(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Close an open record. Returns `false` if it was already closed.
    pub fn close(&mut self, now: DateTime<Utc>) -> bool {
        if self.valid_until.is_some() {
            return false;
        }
        self.valid_until = Some(now.max(self.valid_from));
        true
    }
}
