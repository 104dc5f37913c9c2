//! Static route-protection table.
//!
//! Loaded once at start-up and shared by reference; never mutated at runtime.

use serde::Serialize;

use crate::{Role, RoleSet};

/// Protection tier of a request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "tier", content = "roles")]
pub enum Protection {
    Public,
    Authenticated,
    /// Authenticated and holding at least one of these roles.
    Roles(RoleSet),
}

impl Protection {
    pub fn required_roles(&self) -> Option<&RoleSet> {
        match self {
            Protection::Roles(roles) => Some(roles),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRule {
    pub path_prefix: String,
    pub protection: Protection,
    pub description: Option<String>,
}

impl RouteRule {
    pub fn public(prefix: &str) -> Self {
        Self {
            path_prefix: prefix.to_string(),
            protection: Protection::Public,
            description: None,
        }
    }

    pub fn authenticated(prefix: &str, description: &str) -> Self {
        Self {
            path_prefix: prefix.to_string(),
            protection: Protection::Authenticated,
            description: Some(description.to_string()),
        }
    }

    pub fn roles(prefix: &str, roles: &[Role], description: &str) -> Self {
        Self {
            path_prefix: prefix.to_string(),
            protection: Protection::Roles(roles.iter().copied().collect()),
            description: Some(description.to_string()),
        }
    }

    /// Segment-aware prefix match: `/api/user` matches `/api/user` and
    /// `/api/user/x`, but not `/api/users`.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.trim_end_matches('/');
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Result of classifying a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification<'a> {
    pub protection: &'a Protection,
    /// The rule that matched; `None` means the deny-by-default fallback applied.
    pub rule: Option<&'a RouteRule>,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    fallback: Protection,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules,
            fallback: Protection::Authenticated,
        }
    }

    /// The application's route table.
    pub fn standard() -> Self {
        let admin = [Role::Admin];
        Self::new(vec![
            RouteRule::public("/api/auth/register"),
            RouteRule::public("/api/auth/session"),
            RouteRule::public("/api/auth/verify"),
            RouteRule::public("/api/auth/login"),
            RouteRule::public("/api/auth/logout"),
            RouteRule::public("/api/health"),
            RouteRule::authenticated("/api/user", "User profile management"),
            RouteRule::authenticated("/api/profile", "User profile operations"),
            RouteRule::authenticated("/api/users", "User management operations"),
            RouteRule::roles("/api/admin", &admin, "Admin APIs"),
            RouteRule::roles("/api/admin/users", &admin, "User administration"),
            RouteRule::roles("/api/admin/approvals", &admin, "User approval management"),
            RouteRule::roles("/api/admin/settings", &admin, "System configuration"),
            RouteRule::roles("/api/users/roles", &admin, "Role management operations"),
            RouteRule::roles("/api/users/approve", &admin, "Account approval decisions"),
            RouteRule::roles("/api/settings", &admin, "System settings management"),
        ])
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Longest matching prefix wins; unmatched paths fall back to
    /// [`Protection::Authenticated`].
    pub fn classify(&self, path: &str) -> Classification<'_> {
        let rule = self
            .rules
            .iter()
            .filter(|r| r.matches(path))
            .max_by_key(|r| r.path_prefix.trim_end_matches('/').len());

        match rule {
            Some(rule) => Classification {
                protection: &rule.protection,
                rule: Some(rule),
            },
            None => Classification {
                protection: &self.fallback,
                rule: None,
            },
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}
