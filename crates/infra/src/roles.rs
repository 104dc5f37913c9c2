//! Role Service: the `roles` snapshot on each account plus its audit trail.
//!
//! Every mutation writes the account and its assignment records in one
//! [`WriteBatch`], guarded by the account version read at the start. A
//! version conflict re-runs the whole read-modify-commit cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use rostergate_auth::{AssignmentScope, InvalidRoles, Role, RoleAssignment, RoleSet, roles::format_roles};
use rostergate_core::{DomainError, UserId};

use crate::store::{AssignmentFilter, DocumentStore, MAX_COMMIT_ATTEMPTS, StoreError, WriteBatch};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error(transparent)]
    InvalidRole(#[from] InvalidRoles),

    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoleError {
    pub fn code(&self) -> &'static str {
        match self {
            RoleError::InvalidRole(_) => "invalid_role",
            RoleError::UserNotFound => "user_not_found",
            RoleError::Validation(_) => "validation_failed",
            RoleError::Store(e) => e.code(),
        }
    }
}

/// Result of a role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub user_id: UserId,
    pub roles: RoleSet,
    /// Open assignment records for `roles` after the commit.
    pub assignments: Vec<RoleAssignment>,
    pub opened: usize,
    pub closed: usize,
}

/// Assignment records staged for a role-set replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StagedRoles {
    pub assignments: Vec<RoleAssignment>,
    pub opened: usize,
    pub closed: usize,
}

/// Stage the audit-trail writes that move a user from the roles of its `open`
/// records to `roles`. The caller adds the account write to the same batch.
pub(crate) fn stage_roles(
    user: &UserId,
    open: Vec<RoleAssignment>,
    roles: &RoleSet,
    assigned_by: &UserId,
    scope: Option<AssignmentScope>,
    now: DateTime<Utc>,
    batch: &mut WriteBatch,
) -> StagedRoles {
    let mut assignments = Vec::new();
    let (mut opened, mut closed) = (0, 0);

    for mut record in open {
        if roles.contains(&record.role) && !assignments.iter().any(|r: &RoleAssignment| r.role == record.role) {
            assignments.push(record);
        } else if record.close(now) {
            closed += 1;
            batch.put_assignment(record);
        }
    }
    for role in roles {
        if !assignments.iter().any(|r| r.role == *role) {
            let record = RoleAssignment::open(user.clone(), *role, assigned_by.clone(), scope.clone(), now);
            batch.put_assignment(record.clone());
            assignments.push(record);
            opened += 1;
        }
    }
    assignments.sort_by_key(|r| r.role);

    StagedRoles {
        assignments,
        opened,
        closed,
    }
}

#[derive(Clone)]
pub struct RoleService {
    store: Arc<dyn DocumentStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Replace the user's roles with `names`.
    ///
    /// Unknown names reject the whole call before anything is read. Roles kept
    /// from the previous set keep their open record, dropped roles have theirs
    /// closed and new roles get a fresh one, all in the same batch.
    pub async fn assign_roles<S: AsRef<str>>(
        &self,
        user: &UserId,
        names: &[S],
        assigned_by: &UserId,
        scope: Option<AssignmentScope>,
    ) -> Result<RoleGrant, RoleError> {
        let roles = Role::parse_all(names)?;
        if roles.is_empty() {
            return Err(DomainError::validation("roles", "must contain at least one role").into());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_assign(user, &roles, assigned_by, scope.clone()).await {
                Err(RoleError::Store(StoreError::Conflict(msg))) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(user = %user, attempt, %msg, "role assignment conflicted; retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_assign(
        &self,
        user: &UserId,
        roles: &RoleSet,
        assigned_by: &UserId,
        scope: Option<AssignmentScope>,
    ) -> Result<RoleGrant, RoleError> {
        let mut account = self.store.get_account(user).await?.ok_or(RoleError::UserNotFound)?;
        let open = self
            .store
            .assignments_for(
                user,
                AssignmentFilter {
                    role: None,
                    active_only: true,
                },
            )
            .await?;

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        let staged = stage_roles(user, open, roles, assigned_by, scope, now, &mut batch);

        let previous = std::mem::replace(&mut account.roles, roles.clone());
        account.touch(now);
        batch.put_account(account);
        self.store.commit(batch).await?;

        info!(
            user = %user,
            assigned_by = %assigned_by,
            previous_roles = %format_roles(&previous),
            roles = %format_roles(roles),
            opened = staged.opened,
            closed = staged.closed,
            "roles assigned"
        );
        Ok(RoleGrant {
            user_id: user.clone(),
            roles: roles.clone(),
            assignments: staged.assignments,
            opened: staged.opened,
            closed: staged.closed,
        })
    }

    /// Remove one role. Removing a role the user does not hold is a no-op.
    pub async fn remove_role(&self, user: &UserId, name: &str, removed_by: &UserId) -> Result<(), RoleError> {
        let role: Role = name.parse()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_remove(user, role, removed_by).await {
                Err(RoleError::Store(StoreError::Conflict(msg))) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(user = %user, attempt, %msg, "role removal conflicted; retrying");
                }
                other => return other,
            }
        }
    }

    async fn try_remove(&self, user: &UserId, role: Role, removed_by: &UserId) -> Result<(), RoleError> {
        let mut account = self.store.get_account(user).await?.ok_or(RoleError::UserNotFound)?;
        let open = self
            .store
            .assignments_for(
                user,
                AssignmentFilter {
                    role: Some(role),
                    active_only: true,
                },
            )
            .await?;

        let held = account.roles.contains(&role);
        if !held && open.is_empty() {
            return Ok(());
        }
        if held && account.roles.len() == 1 {
            return Err(DomainError::validation("role", "cannot remove the last remaining role").into());
        }

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        for mut record in open {
            if record.close(now) {
                batch.put_assignment(record);
            }
        }
        account.roles.remove(&role);
        account.touch(now);
        batch.put_account(account);
        self.store.commit(batch).await?;

        info!(user = %user, removed_by = %removed_by, role = %role, "role removed");
        Ok(())
    }

    /// Membership check against the account's `roles` snapshot.
    pub async fn has_role(&self, user: &UserId, role: Role) -> Result<bool, RoleError> {
        Ok(self
            .store
            .get_account(user)
            .await?
            .is_some_and(|a| a.roles.contains(&role)))
    }

    pub async fn has_any_role(&self, user: &UserId, roles: &RoleSet) -> Result<bool, RoleError> {
        Ok(self
            .store
            .get_account(user)
            .await?
            .is_some_and(|a| !a.roles.is_disjoint(roles)))
    }

    /// Full audit trail for a user, open and closed records alike.
    pub async fn assignments(&self, user: &UserId, active_only: bool) -> Result<Vec<RoleAssignment>, RoleError> {
        if self.store.get_account(user).await?.is_none() {
            return Err(RoleError::UserNotFound);
        }
        Ok(self
            .store
            .assignments_for(user, AssignmentFilter { role: None, active_only })
            .await?)
    }

    pub async fn active_assignments(&self, user: &UserId) -> Result<Vec<RoleAssignment>, RoleError> {
        self.assignments(user, true).await
    }
}
