use rostergate_auth::{Principal, RoleSet};
use rostergate_core::UserId;

/// Principal context for a request (approved identity + current roles).
///
/// Inserted by the authorization middleware only; never built from client
/// headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> &UserId {
        &self.principal.user_id
    }

    pub fn roles(&self) -> &RoleSet {
        &self.principal.roles
    }
}

/// Best-effort remote origin of a request, for audit logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrigin(pub String);

impl RemoteOrigin {
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }
}

impl core::fmt::Display for RemoteOrigin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
