//! `rostergate-core`: shared building blocks for the authorization layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, FieldProblem};
pub use id::{AssignmentId, UserId};
