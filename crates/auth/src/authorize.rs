use thiserror::Error;

use crate::{Permission, Principal, RoleSet, roles::format_roles};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: requires one of [{}], has [{}]", format_roles(.required), format_roles(.actual))]
    MissingRole { required: RoleSet, actual: RoleSet },

    #[error("forbidden: missing permission '{0}'")]
    MissingPermission(Permission),
}

/// Role gate: admit iff the principal holds at least one of `required`.
///
/// An empty `required` set imposes no role restriction.
pub fn authorize_roles(principal: &Principal, required: &RoleSet) -> Result<(), AuthzError> {
    if required.is_empty() || !principal.roles.is_disjoint(required) {
        Ok(())
    } else {
        Err(AuthzError::MissingRole {
            required: required.clone(),
            actual: principal.roles.clone(),
        })
    }
}

/// Permission gate over the role-derived permission lists.
pub fn authorize(principal: &Principal, required: Permission) -> Result<(), AuthzError> {
    if principal.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(required))
    }
}
