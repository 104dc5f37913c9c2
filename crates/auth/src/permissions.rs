use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are derived from roles (see [`crate::Role::permissions`]) and are
/// recorded on every role-assignment audit record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    ManageRoles,
    ManageTournaments,
    ManageTeams,
    ManagePayments,
    ViewAll,
    ViewPlayers,
    ManageTeamSelection,
    ViewPlayerStats,
    ManageAvailability,
    ManageTeam,
    ViewTeamStats,
    ManageTeamSchedule,
    ManageTeamPayments,
    ViewOwnStats,
    ManageOwnAvailability,
    ViewTeamSchedule,
    ViewTeamSelection,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageUsers => "manage_users",
            Permission::ManageRoles => "manage_roles",
            Permission::ManageTournaments => "manage_tournaments",
            Permission::ManageTeams => "manage_teams",
            Permission::ManagePayments => "manage_payments",
            Permission::ViewAll => "view_all",
            Permission::ViewPlayers => "view_players",
            Permission::ManageTeamSelection => "manage_team_selection",
            Permission::ViewPlayerStats => "view_player_stats",
            Permission::ManageAvailability => "manage_availability",
            Permission::ManageTeam => "manage_team",
            Permission::ViewTeamStats => "view_team_stats",
            Permission::ManageTeamSchedule => "manage_team_schedule",
            Permission::ManageTeamPayments => "manage_team_payments",
            Permission::ViewOwnStats => "view_own_stats",
            Permission::ManageOwnAvailability => "manage_own_availability",
            Permission::ViewTeamSchedule => "view_team_schedule",
            Permission::ViewTeamSelection => "view_team_selection",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
