//! Access-control rules over accounts: visibility, field projection and
//! update permission. Pure functions; storage lookups are the caller's job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use rostergate_core::UserId;

use crate::{Account, AccountPatch, ApprovalStatus, PlayerDetails, Principal, SubscriptionStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("forbidden")]
    Forbidden,

    #[error("not allowed to update fields: {}", .0.join(", "))]
    UnauthorizedFields(Vec<String>),

    #[error("user not found")]
    UserNotFound,
}

impl AccessError {
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Forbidden => "forbidden",
            AccessError::UnauthorizedFields(_) => "unauthorized_fields",
            AccessError::UserNotFound => "user_not_found",
        }
    }
}

/// Whether `requester` may see `target` at all.
///
/// `false` must be surfaced as "not found" so that existence of unapproved or
/// foreign accounts is not confirmed.
pub fn can_access(requester: &Principal, target: Option<&Account>) -> bool {
    let Some(target) = target else {
        return false;
    };
    requester.is_admin() || requester.is(&target.uid) || target.approval_status == ApprovalStatus::Approved
}

/// Self-view: everything except `roles` and `emailVerified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnProfile {
    pub uid: UserId,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<u8>,
    pub approval_status: ApprovalStatus,
    pub subscription_status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub player_details: PlayerDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Third-party view: exactly five fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub uid: UserId,
    pub display_name: String,
    pub jersey_number: Option<u8>,
    pub approval_status: ApprovalStatus,
    pub player_details: PlayerDetails,
}

/// Field-level projection of an account for a given requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AccountView {
    Full(Account),
    Own(OwnProfile),
    Public(PublicProfile),
}

impl OwnProfile {
    pub fn of(account: Account) -> Self {
        Self {
            uid: account.uid,
            email: account.email,
            display_name: account.display_name,
            phone_number: account.phone_number,
            date_of_birth: account.date_of_birth,
            jersey_number: account.jersey_number,
            approval_status: account.approval_status,
            subscription_status: account.subscription_status,
            last_login: account.last_login,
            player_details: account.player_details,
            approved_by: account.approved_by,
            approved_at: account.approved_at,
            rejection_reason: account.rejection_reason,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

impl PublicProfile {
    pub fn of(account: Account) -> Self {
        Self {
            uid: account.uid,
            display_name: account.display_name,
            jersey_number: account.jersey_number,
            approval_status: account.approval_status,
            player_details: account.player_details,
        }
    }
}

pub fn sanitize(account: Account, requester: &Principal) -> AccountView {
    if requester.is_admin() {
        AccountView::Full(account)
    } else if requester.is(&account.uid) {
        AccountView::Own(OwnProfile::of(account))
    } else {
        AccountView::Public(PublicProfile::of(account))
    }
}

/// Update permission check.
///
/// Non-admins: another user's record is `Forbidden` (decided without looking
/// the target up); on their own record any sensitive field rejects the whole
/// patch. Admins: unrestricted fields, but the target must exist.
pub fn check_update(
    requester: &Principal,
    target_id: &UserId,
    target_exists: bool,
    patch: &AccountPatch,
) -> Result<(), AccessError> {
    if requester.is_admin() {
        return if target_exists {
            Ok(())
        } else {
            Err(AccessError::UserNotFound)
        };
    }
    if !requester.is(target_id) {
        return Err(AccessError::Forbidden);
    }
    let sensitive = patch.sensitive_fields();
    if !sensitive.is_empty() {
        return Err(AccessError::UnauthorizedFields(
            sensitive.into_iter().map(str::to_string).collect(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, RoleSet};
    use proptest::prelude::*;

    fn account(uid: &str, status: ApprovalStatus, roles: RoleSet) -> Account {
        let now = Utc::now();
        Account {
            uid: UserId::new(uid),
            email: format!("{uid}@example.com"),
            display_name: format!("Player {uid}"),
            phone_number: Some("9876543210".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
            jersey_number: Some(7),
            roles,
            approval_status: status,
            email_verified: true,
            subscription_status: SubscriptionStatus::Inactive,
            last_login: Some(now),
            player_details: PlayerDetails::default(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    fn principal(uid: &str, roles: &[Role]) -> Principal {
        Principal {
            user_id: UserId::new(uid),
            email: format!("{uid}@example.com"),
            roles: roles.iter().copied().collect(),
        }
    }

    fn keys(view: &AccountView) -> Vec<String> {
        let json = serde_json::to_value(view).unwrap();
        let mut keys: Vec<String> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn can_access_matrix() {
        let player = principal("u", &[Role::Player]);
        let admin = principal("root", &[Role::Admin]);
        let pending = account("other", ApprovalStatus::Pending, RoleSet::from([Role::Player]));
        let approved = account("peer", ApprovalStatus::Approved, RoleSet::from([Role::Player]));
        let me = account("u", ApprovalStatus::Pending, RoleSet::from([Role::Player]));

        assert!(can_access(&admin, Some(&pending)));
        assert!(can_access(&player, Some(&me)));
        assert!(can_access(&player, Some(&approved)));
        assert!(!can_access(&player, Some(&pending)));
        assert!(!can_access(&admin, None));
    }

    #[test]
    fn public_projection_has_exactly_five_fields() {
        let viewer = principal("viewer", &[Role::Player]);
        let target = account("t", ApprovalStatus::Approved, RoleSet::from([Role::Selector]));
        let view = sanitize(target, &viewer);
        assert_eq!(
            keys(&view),
            vec!["approvalStatus", "displayName", "jerseyNumber", "playerDetails", "uid"]
        );
    }

    #[test]
    fn own_projection_hides_authorization_state() {
        let me = principal("u", &[Role::Player]);
        let view = sanitize(account("u", ApprovalStatus::Approved, RoleSet::from([Role::Player])), &me);
        let keys = keys(&view);
        assert!(!keys.contains(&"roles".to_string()));
        assert!(!keys.contains(&"emailVerified".to_string()));
        assert!(keys.contains(&"email".to_string()));
        assert!(keys.contains(&"phoneNumber".to_string()));
    }

    #[test]
    fn admin_sees_the_full_record() {
        let admin = principal("root", &[Role::Admin]);
        let target = account("t", ApprovalStatus::Rejected, RoleSet::from([Role::Manager]));
        assert_eq!(sanitize(target.clone(), &admin), AccountView::Full(target));
    }

    #[test]
    fn update_rules() {
        let me = principal("u", &[Role::Player]);
        let admin = principal("root", &[Role::Admin]);
        let jersey = AccountPatch {
            jersey_number: Some(9),
            ..Default::default()
        };
        let roles = AccountPatch {
            roles: Some(Some(vec!["admin".to_string()])),
            ..Default::default()
        };

        assert_eq!(check_update(&me, &UserId::new("other"), true, &jersey), Err(AccessError::Forbidden));
        // no existence leak for foreign targets
        assert_eq!(check_update(&me, &UserId::new("ghost"), false, &jersey), Err(AccessError::Forbidden));
        assert_eq!(check_update(&me, &UserId::new("u"), true, &jersey), Ok(()));
        assert_eq!(
            check_update(&me, &UserId::new("u"), true, &roles),
            Err(AccessError::UnauthorizedFields(vec!["roles".to_string()]))
        );
        assert_eq!(check_update(&admin, &UserId::new("u"), true, &roles), Ok(()));
        assert_eq!(check_update(&admin, &UserId::new("ghost"), false, &jersey), Err(AccessError::UserNotFound));
    }

    #[test]
    fn null_sensitive_fields_are_still_unauthorized() {
        let me = principal("u", &[Role::Player]);
        let patch: AccountPatch =
            serde_json::from_str(r#"{"jerseyNumber": 9, "roles": null, "uid": null}"#).unwrap();
        assert_eq!(
            check_update(&me, &UserId::new("u"), true, &patch),
            Err(AccessError::UnauthorizedFields(vec!["roles".to_string(), "uid".to_string()]))
        );
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn any_status() -> impl Strategy<Value = ApprovalStatus> {
        prop::sample::select(vec![ApprovalStatus::Pending, ApprovalStatus::Approved, ApprovalStatus::Rejected])
    }

    proptest! {
        #[test]
        fn third_party_view_never_leaks(
            viewer_roles in prop::collection::btree_set(any_role(), 1..4),
            target_roles in prop::collection::btree_set(any_role(), 1..4),
            status in any_status(),
        ) {
            prop_assume!(!viewer_roles.contains(&Role::Admin));
            let viewer = Principal { user_id: UserId::new("v"), email: "v@example.com".into(), roles: viewer_roles };
            let view = sanitize(account("t", status, target_roles), &viewer);
            prop_assert_eq!(
                keys(&view),
                vec!["approvalStatus", "displayName", "jerseyNumber", "playerDetails", "uid"]
            );
        }

        #[test]
        fn self_view_never_contains_roles(roles in prop::collection::btree_set(any_role(), 1..4), status in any_status()) {
            prop_assume!(!roles.contains(&Role::Admin));
            let me = Principal { user_id: UserId::new("u"), email: "u@example.com".into(), roles: roles.clone() };
            let view = sanitize(account("u", status, roles), &me);
            let keys = keys(&view);
            prop_assert!(!keys.iter().any(|k| k == "roles" || k == "emailVerified"));
        }
    }
}
