//! A single locked store: one commitment, one owner, one lock flag.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use super::StoreHandle;
use crate::access::{AccessGuard, Operation, Principal};
use crate::audit::{AuditEntry, AuditLog, Outcome};
use crate::crypto::SecretCommitment;
use crate::error::Result;
use crate::storage::StateBackend;

/// Lock flag. The only transition is `Locked -> Unlocked`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Result of an unlock attempt. None of the variants carry the commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockResult {
    Success,
    Failure,
    Denied,
}

/// Persisted layout of a store slot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoreRecord {
    pub commitment: SecretCommitment,
    pub lock_state: LockState,
    pub owner: Principal,
}

pub struct SecretStore {
    handle: StoreHandle,
    commitment: SecretCommitment,
    guard: AccessGuard,
    state: Mutex<LockState>,
}

impl SecretStore {
    pub(super) fn new(handle: StoreHandle, commitment: SecretCommitment, owner: Principal) -> Self {
        Self::from_record(
            handle,
            StoreRecord { commitment, lock_state: LockState::Locked, owner },
        )
    }

    pub(super) fn from_record(handle: StoreHandle, record: StoreRecord) -> Self {
        Self {
            handle,
            commitment: record.commitment,
            guard: AccessGuard::new(record.owner),
            state: Mutex::new(record.lock_state),
        }
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn is_locked(&self) -> bool {
        *self.lock() == LockState::Locked
    }

    pub fn record(&self) -> StoreRecord {
        self.record_with(*self.lock())
    }

    fn record_with(&self, lock_state: LockState) -> StoreRecord {
        StoreRecord {
            commitment: self.commitment,
            lock_state,
            owner: self.guard.owner().clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authorize, compare and transition as one critical section.
    ///
    /// Exactly one audit entry is written per call. If persisting the attempt
    /// fails nothing changes, in memory or on disk, and the fault is returned.
    pub fn try_unlock(
        &self,
        principal: &Principal,
        candidate: &[u8],
        audit: &AuditLog,
        backend: &dyn StateBackend,
    ) -> Result<UnlockResult> {
        let mut state = self.lock();
        let current = *state;

        // 1. Access check
        if !self.guard.authorize(principal, Operation::Unlock.kind()).is_permit() {
            let entry = AuditEntry::new(
                self.handle,
                principal.clone(),
                Operation::Unlock,
                Outcome::Denied,
                current,
                false,
            );
            audit.append_with(entry, |e, evict| {
                backend.commit_attempt(self.handle, None, e, evict)
            })?;
            flush_committed(backend);
            warn!(store = %self.handle, caller = %principal, "Unlock denied: caller is not the owner");
            return Ok(UnlockResult::Denied);
        }

        // 2. Compare
        let matched = self.commitment.verify(candidate);
        let next = if matched { LockState::Unlocked } else { current };
        let transitioned = current == LockState::Locked && next == LockState::Unlocked;
        let outcome = if matched { Outcome::Success } else { Outcome::Failure };

        // 3. Persist record + audit together, then publish
        let record = transitioned.then(|| self.record_with(next));
        let entry = AuditEntry::new(
            self.handle,
            principal.clone(),
            Operation::Unlock,
            outcome,
            next,
            transitioned,
        );
        audit.append_with(entry, |e, evict| {
            backend.commit_attempt(self.handle, record.as_ref(), e, evict)
        })?;
        *state = next;
        flush_committed(backend);

        if transitioned {
            info!(store = %self.handle, caller = %principal, "Store unlocked");
        } else if !matched {
            warn!(store = %self.handle, caller = %principal, "Unlock attempt failed");
        }

        Ok(if matched { UnlockResult::Success } else { UnlockResult::Failure })
    }

    /// Record a denial for a caller whose identifier did not resolve to a
    /// principal. The candidate is never examined.
    pub fn deny_unresolved(
        &self,
        raw_caller: &str,
        audit: &AuditLog,
        backend: &dyn StateBackend,
    ) -> Result<UnlockResult> {
        let state = self.lock();
        let entry = AuditEntry::unresolved(self.handle, Operation::Unlock, *state);
        audit.append_with(entry, |e, evict| {
            backend.commit_attempt(self.handle, None, e, evict)
        })?;
        flush_committed(backend);
        warn!(store = %self.handle, caller = ?raw_caller, "Unlock denied: caller could not be resolved");
        Ok(UnlockResult::Denied)
    }
}

/// The attempt is already committed, so a failed flush does not undo it.
/// It is reported here and surfaces again on the next explicit flush.
pub(super) fn flush_committed(backend: &dyn StateBackend) {
    if let Err(e) = backend.flush() {
        error!("Flush after commit failed: {}", e);
    }
}
