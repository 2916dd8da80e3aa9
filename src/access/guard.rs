//! Owner/public authorization decisions

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::principal::Principal;

/// How an operation is gated.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Anyone may call.
    Public,
    /// Only the registered owner may call.
    Privileged,
}

/// Operations a store exposes to callers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Unlock,
    Status,
    ReadAudit,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Unlock | Self::ReadAudit => OperationKind::Privileged,
            Self::Status => OperationKind::Public,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthResult {
    Permit,
    Deny,
}

impl AuthResult {
    pub fn is_permit(&self) -> bool {
        matches!(self, Self::Permit)
    }
}

/// Pure decision function over an immutable owner.
///
/// The guard never enforces anything itself; callers must act on the
/// returned [`AuthResult`] before touching state.
#[derive(Clone, Debug)]
pub struct AccessGuard {
    owner: Principal,
}

impl AccessGuard {
    pub fn new(owner: Principal) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn authorize(&self, principal: &Principal, kind: OperationKind) -> AuthResult {
        match kind {
            OperationKind::Public => AuthResult::Permit,
            OperationKind::Privileged if *principal == self.owner => AuthResult::Permit,
            OperationKind::Privileged => AuthResult::Deny,
        }
    }

    /// Resolve a raw caller id and authorize it. Unresolvable ids are denied
    /// even for public operations.
    pub fn authorize_raw(&self, raw: &str, kind: OperationKind) -> AuthResult {
        match Principal::parse(raw) {
            Ok(principal) => self.authorize(&principal, kind),
            Err(e) => {
                debug!("Principal resolution failed, denying: {}", e);
                AuthResult::Deny
            }
        }
    }
}
