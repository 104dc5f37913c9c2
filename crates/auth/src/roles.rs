use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Permission;

/// Role identifier used for RBAC.
///
/// The vocabulary is closed: anything outside these four labels is rejected
/// when parsed, so every `Role` value has a known permission list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Player,
    Selector,
    Manager,
}

/// Duplicate-free, order-irrelevant set of roles.
pub type RoleSet = BTreeSet<Role>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid roles: {}", .offenders.join(", "))]
pub struct InvalidRoles {
    pub offenders: Vec<String>,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Player, Role::Selector, Role::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Player => "player",
            Role::Selector => "selector",
            Role::Manager => "manager",
        }
    }

    /// Static permission list granted by this role.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => &[
                ManageUsers,
                ManageRoles,
                ManageTournaments,
                ManageTeams,
                ManagePayments,
                ViewAll,
            ],
            Role::Selector => &[
                ViewPlayers,
                ManageTeamSelection,
                ViewPlayerStats,
                ManageAvailability,
            ],
            Role::Manager => &[
                ManageTeam,
                ViewTeamStats,
                ManageTeamSchedule,
                ManageTeamPayments,
            ],
            Role::Player => &[
                ViewOwnStats,
                ManageOwnAvailability,
                ViewTeamSchedule,
                ViewTeamSelection,
            ],
        }
    }

    /// Parse a whole batch of role names.
    ///
    /// All-or-nothing: if any name is outside the vocabulary the call fails and
    /// lists every offender.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<RoleSet, InvalidRoles> {
        let mut roles = RoleSet::new();
        let mut offenders = Vec::new();
        for name in names {
            match name.as_ref().parse::<Role>() {
                Ok(role) => {
                    roles.insert(role);
                }
                Err(_) => offenders.push(name.as_ref().to_string()),
            }
        }
        if offenders.is_empty() {
            Ok(roles)
        } else {
            Err(InvalidRoles { offenders })
        }
    }
}

/// Roles granted to a freshly registered account.
pub fn default_roles() -> RoleSet {
    RoleSet::from([Role::Player])
}

impl FromStr for Role {
    type Err = InvalidRoles;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "player" => Ok(Role::Player),
            "selector" => Ok(Role::Selector),
            "manager" => Ok(Role::Manager),
            other => Err(InvalidRoles {
                offenders: vec![other.to_string()],
            }),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a role set as a comma-separated list (for logs).
pub fn format_roles(roles: &RoleSet) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
}
