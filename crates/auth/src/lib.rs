//! `rostergate-auth`: pure authorization domain.
//!
//! Roles, accounts, session claims, the route-protection table and the
//! access-control rules. This crate is intentionally decoupled from HTTP and
//! storage.

pub mod access;
pub mod account;
pub mod assignment;
pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod routes;
pub mod session;

pub use access::{AccessError, AccountView, OwnProfile, PublicProfile, can_access, check_update, sanitize};
pub use account::{
    Account, AccountPatch, ApprovalError, ApprovalStatus, PlayerDetails, Registration, SubscriptionStatus,
    ValidRegistration,
};
pub use assignment::{AssignmentScope, RoleAssignment};
pub use authorize::{AuthzError, authorize, authorize_roles};
pub use claims::{SessionClaims, TokenKind, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::{InvalidRoles, Role, RoleSet, default_roles};
pub use routes::{Classification, Protection, RouteRule, RouteTable};
pub use session::{Identity, SessionError};
