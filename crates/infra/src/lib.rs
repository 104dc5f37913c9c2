//! Infrastructure layer: document store, identity provider and the services
//! that combine them with the authorization rules.

pub mod approval;
pub mod directory;
pub mod identity;
pub mod roles;
pub mod session;
pub mod store;

pub use approval::{ApprovalGate, Decision, GateError};
pub use directory::{DirectoryError, ListRequest, PageInfo, UserDirectory, UserListing};
pub use identity::{IdentityError, IdentityProvider, LocalIdentityConfig, LocalIdentityProvider};
pub use roles::{RoleError, RoleGrant, RoleService};
pub use session::{EstablishedSession, SessionFlowError, SessionManager, SessionVerifier, ValidatedSession};
pub use store::{CredentialStore, DocumentStore, InMemoryDocumentStore, StoreError, StoredCredential, WriteBatch};
