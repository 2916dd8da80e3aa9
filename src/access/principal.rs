//! Caller identity

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, VaultError};

const MAX_PRINCIPAL_LEN: usize = 128;

/// Identity of a caller, compared by exact equality.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    /// Resolve a raw identifier (an account name, an address, ...) into a principal.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VaultError::InvalidPrincipal("empty identifier".to_string()));
        }
        if raw.len() > MAX_PRINCIPAL_LEN {
            return Err(VaultError::InvalidPrincipal(format!(
                "identifier longer than {} bytes",
                MAX_PRINCIPAL_LEN
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(VaultError::InvalidPrincipal(
                "identifier contains whitespace or control characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
