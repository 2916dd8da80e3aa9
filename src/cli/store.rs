//! Handlers for the store subcommands.

use crate::access::{Operation, Principal};
use crate::audit::AuditFilter;
use crate::crypto::{encode_slot, SecretCommitment};
use crate::error::{Result, VaultError};
use crate::vault::{StoreHandle, UnlockResult, Vault};

/// Passwords travel in the fixed 32-byte slot form before hashing.
fn commitment_for(password: &str) -> Result<SecretCommitment> {
    Ok(SecretCommitment::derive(&encode_slot(password)?))
}

pub fn handle_commit(password: &str) -> Result<()> {
    println!("{}", commitment_for(password)?.to_hex());
    Ok(())
}

pub fn handle_create(
    vault: &Vault,
    owner: &str,
    password: Option<&str>,
    commitment: Option<&str>,
) -> Result<()> {
    let owner = Principal::parse(owner)?;
    let commitment = match (password, commitment) {
        (Some(pw), None) => commitment_for(pw)?,
        (None, Some(hex)) => SecretCommitment::from_hex(hex)?,
        _ => {
            return Err(VaultError::InvalidCommitment(
                "give exactly one of --password or --commitment".to_string(),
            ))
        }
    };
    let handle = vault.create(commitment, owner)?;
    println!("Store {} created (locked).", handle.id());
    Ok(())
}

/// Returns true when the store ends up unlocked.
pub fn handle_unlock(vault: &Vault, store: u64, caller: &str, password: &str) -> Result<bool> {
    let handle = StoreHandle::from_raw(store);
    let slot = encode_slot(password)?;
    match vault.try_unlock_raw(handle, caller, &slot)? {
        UnlockResult::Success => {
            println!("Store {} unlocked.", store);
            Ok(true)
        }
        UnlockResult::Failure => {
            let locked = vault.is_locked(handle)?;
            println!(
                "Wrong password. Store {} is {}.",
                store,
                if locked { "still locked" } else { "already unlocked" }
            );
            Ok(!locked)
        }
        UnlockResult::Denied => {
            println!("Denied: '{}' is not the owner of store {}.", caller, store);
            Ok(false)
        }
    }
}

pub fn handle_status(vault: &Vault, store: u64) -> Result<()> {
    let locked = vault.is_locked(StoreHandle::from_raw(store))?;
    println!("Store {}: {}", store, if locked { "locked" } else { "unlocked" });
    Ok(())
}

/// Returns false when the caller may not read this store's trail.
pub fn handle_audit(
    vault: &Vault,
    store: u64,
    caller: &str,
    principal: Option<&str>,
    transitions_only: bool,
    json: bool,
) -> Result<bool> {
    let handle = StoreHandle::from_raw(store);
    let denied = || -> Result<bool> {
        println!("Denied: '{}' may not read the audit trail of store {}.", caller, store);
        Ok(false)
    };
    if !vault.authorize_raw(handle, caller, Operation::ReadAudit.kind())?.is_permit() {
        return denied();
    }
    let caller = Principal::parse(caller)?;
    let mut filter = AuditFilter::default();
    if let Some(p) = principal {
        filter = filter.principal(Principal::parse(p)?);
    }
    if transitions_only {
        filter = filter.transitions_only();
    }

    let Some(entries) = vault.read_audit(handle, &caller, filter)? else {
        return denied();
    };

    for entry in entries {
        if json {
            let line = serde_json::to_string(&entry)
                .map_err(|e| VaultError::Encoding(e.to_string()))?;
            println!("{}", line);
        } else {
            println!(
                "{:>6}  {}  store {}  {:<12} {:?} -> {:?}{}",
                entry.seq,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.store.id(),
                entry.principal.as_ref().map_or("<unresolved>", Principal::as_str),
                entry.outcome,
                entry.new_state,
                if entry.transitioned { "  (transition)" } else { "" }
            );
        }
    }
    Ok(true)
}

/// Read a slot the way an outsider with raw storage access would.
pub fn handle_inspect(vault: &Vault, store: u64) -> Result<()> {
    let handle = StoreHandle::from_raw(store);
    let record = vault.record(handle)?;
    match vault.raw_slot(handle)? {
        Some(raw) => println!("raw slot ({} bytes): {}", raw.len(), hex::encode(&raw)),
        None => println!("raw slot: not persisted (in-memory store)"),
    }
    println!("commitment: {}", record.commitment.to_hex());
    println!("owner:      {}", record.owner);
    println!("state:      {:?}", record.lock_state);
    println!("slot as text: <not recoverable: one-way digest>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Retention;

    #[test]
    fn test_create_then_unlock_with_slot_password() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        handle_create(&vault, "alice", Some("vault is locked with password"), None).unwrap();
        assert!(!handle_unlock(&vault, 0, "alice", "wrong password").unwrap());
        assert!(!handle_unlock(&vault, 0, "bob", "vault is locked with password").unwrap());
        assert!(handle_unlock(&vault, 0, "alice", "vault is locked with password").unwrap());
        assert!(!vault.is_locked(StoreHandle::from_raw(0)).unwrap());
    }

    #[test]
    fn test_create_from_precomputed_commitment() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        let hex = commitment_for("hunter2").unwrap().to_hex();
        handle_create(&vault, "alice", None, Some(&hex)).unwrap();
        assert!(handle_unlock(&vault, 0, "alice", "hunter2").unwrap());

        assert!(matches!(
            handle_create(&vault, "alice", None, Some("")),
            Err(VaultError::InvalidCommitment(_))
        ));
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn test_overlong_password_rejected() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        let long = "x".repeat(40);
        assert!(matches!(
            handle_create(&vault, "alice", Some(&long), None),
            Err(VaultError::Encoding(_))
        ));
        assert!(vault.is_empty());
    }

    #[test]
    fn test_audit_requires_owner() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        handle_create(&vault, "alice", Some("pw"), None).unwrap();
        handle_unlock(&vault, 0, "alice", "nope").unwrap();
        assert!(handle_audit(&vault, 0, "alice", None, false, true).unwrap());
        assert!(!handle_audit(&vault, 0, "mallory", None, false, false).unwrap());
        assert!(handle_audit(&vault, 7, "alice", None, false, false).is_err());
    }

    #[test]
    fn test_unlock_with_unresolvable_caller_is_audited() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        handle_create(&vault, "alice", Some("pw"), None).unwrap();
        assert!(!handle_unlock(&vault, 0, "ali ce", "pw").unwrap());
        assert!(vault.is_locked(StoreHandle::from_raw(0)).unwrap());
        assert_eq!(vault.audit().len(), 1);
        assert!(!handle_audit(&vault, 0, "ali ce", None, false, false).unwrap());
        assert!(handle_audit(&vault, 0, "alice", None, false, false).unwrap());
    }

    #[test]
    fn test_inspect_shows_no_secret() {
        let vault = Vault::in_memory(Retention::Unbounded).unwrap();
        handle_create(&vault, "alice", Some("pw"), None).unwrap();
        handle_inspect(&vault, 0).unwrap();
        assert!(handle_inspect(&vault, 3).is_err());
    }
}
