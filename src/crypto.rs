//! Secret commitments and the fixed-width password slot encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::fmt;

use crate::error::{Result, VaultError};

/// Width of a commitment in bytes (SHA-256 output).
pub const COMMITMENT_LEN: usize = 32;

/// Width of the legacy password slot.
pub const SLOT_LEN: usize = 32;

const DOMAIN_TAG: &[u8] = b"vault-guard/commitment/v1";

/// One-way commitment to an unlock secret.
///
/// Only this value is ever held in memory or written to disk; the secret it
/// was derived from is dropped as soon as the digest is computed.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretCommitment([u8; COMMITMENT_LEN]);

impl SecretCommitment {
    /// Derive the commitment for a secret.
    pub fn derive(secret: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_TAG);
        hasher.update((secret.len() as u64).to_be_bytes());
        hasher.update(secret);
        Self(hasher.finalize().into())
    }

    /// Accept an already-derived commitment, e.g. one supplied by deployment tooling.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(VaultError::InvalidCommitment("commitment is empty".to_string()));
        }
        if bytes.len() != COMMITMENT_LEN {
            return Err(VaultError::InvalidCommitment(format!(
                "expected {} bytes, got {}",
                COMMITMENT_LEN,
                bytes.len()
            )));
        }
        if bytes.iter().all(|b| *b == 0) {
            return Err(VaultError::InvalidCommitment("commitment is all zero".to_string()));
        }
        let mut out = [0u8; COMMITMENT_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| VaultError::InvalidCommitment(format!("bad hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Check a candidate secret against this commitment.
    ///
    /// The candidate is hashed first, so the comparison always runs over two
    /// fixed-width digests regardless of the candidate's length.
    pub fn verify(&self, candidate: &[u8]) -> bool {
        let other = Self::derive(candidate);
        self.0[..].ct_eq(&other.0[..]).into()
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Commitments are safe to show, but keep logs short.
impl fmt::Debug for SecretCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretCommitment({}..)", &self.to_hex()[..12])
    }
}

/// Pack a UTF-8 password into a zero-padded 32-byte slot.
///
/// At most 31 bytes are accepted so the slot always ends in a terminator.
pub fn encode_slot(password: &str) -> Result<[u8; SLOT_LEN]> {
    let bytes = password.as_bytes();
    if bytes.len() > SLOT_LEN - 1 {
        return Err(VaultError::Encoding(format!(
            "password is {} bytes, slot holds at most {}",
            bytes.len(),
            SLOT_LEN - 1
        )));
    }
    let mut slot = [0u8; SLOT_LEN];
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "vault is locked with password";

    #[test]
    fn test_verify_matches_only_original_secret() {
        let c = SecretCommitment::derive(PASSWORD.as_bytes());
        assert!(c.verify(PASSWORD.as_bytes()));
        assert!(!c.verify(b"wrong password"));
        assert!(!c.verify(b""));
    }

    #[test]
    fn test_commitment_does_not_contain_secret() {
        let c = SecretCommitment::derive(PASSWORD.as_bytes());
        let raw = c.as_bytes();
        assert!(!raw.windows(5).any(|w| w == b"vault"));
    }

    #[test]
    fn test_from_bytes_rejects_malformed() {
        assert!(matches!(
            SecretCommitment::from_bytes(&[]),
            Err(VaultError::InvalidCommitment(_))
        ));
        assert!(matches!(
            SecretCommitment::from_bytes(&[1u8; 31]),
            Err(VaultError::InvalidCommitment(_))
        ));
        assert!(matches!(
            SecretCommitment::from_bytes(&[0u8; 32]),
            Err(VaultError::InvalidCommitment(_))
        ));

        let c = SecretCommitment::derive(b"x");
        assert_eq!(SecretCommitment::from_bytes(c.as_bytes()).unwrap(), c);
        assert_eq!(SecretCommitment::from_hex(&c.to_hex()).unwrap(), c);
    }

    #[test]
    fn test_slot_encoding() {
        let slot = encode_slot(PASSWORD).unwrap();
        assert_eq!(&slot[..PASSWORD.len()], PASSWORD.as_bytes());
        assert!(slot[PASSWORD.len()..].iter().all(|b| *b == 0));
        assert_eq!(slot[SLOT_LEN - 1], 0);

        let too_long = "a".repeat(32);
        assert!(encode_slot(&too_long).is_err());
        assert!(encode_slot(&"a".repeat(31)).is_ok());
    }
}
