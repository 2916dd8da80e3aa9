//! Access control for store operations
//!
//! - Principals (caller identities)
//! - A single-owner guard that fails closed

pub mod guard;
pub mod principal;

pub use guard::{AccessGuard, AuthResult, Operation, OperationKind};
pub use principal::Principal;
