//! Append-only audit trail of unlock attempts.
//!
//! Appends are serialized through a single writer lock that also hands out
//! sequence numbers, so the in-memory log is always ordered by `seq`. Readers
//! only ever take the entries lock briefly and see a prefix of that order.

pub mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::access::{Operation, Principal};
use crate::error::{Result, VaultError};
use crate::storage::StateBackend;
use crate::vault::{LockState, StoreHandle};

pub use query::{AuditFilter, AuditQuery};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Rejected by the access guard before the secret was examined.
    Denied,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub store: StoreHandle,
    /// `None` when the caller's raw identifier could not be resolved.
    pub principal: Option<Principal>,
    pub operation: Operation,
    pub outcome: Outcome,
    pub new_state: LockState,
    /// True only for the single Locked -> Unlocked transition of a store.
    pub transitioned: bool,
}

impl AuditEntry {
    /// A new entry stamped with the current time. `seq` is assigned on append.
    pub fn new(
        store: StoreHandle,
        principal: Principal,
        operation: Operation,
        outcome: Outcome,
        new_state: LockState,
        transitioned: bool,
    ) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            store,
            principal: Some(principal),
            operation,
            outcome,
            new_state,
            transitioned,
        }
    }

    /// A denial for a caller whose identity could not be resolved.
    pub fn unresolved(store: StoreHandle, operation: Operation, state: LockState) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            store,
            principal: None,
            operation,
            outcome: Outcome::Denied,
            new_state: state,
            transitioned: false,
        }
    }
}

/// How many audit entries are kept, in memory and in the backend.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Retention {
    #[default]
    Unbounded,
    /// Keep the newest `capacity` entries; the oldest are evicted first.
    Ring { capacity: usize },
}

impl Retention {
    pub fn validate(&self) -> Result<()> {
        if let Self::Ring { capacity: 0 } = self {
            return Err(VaultError::Config("audit ring capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The seq that falls out of the ring when `seq` is appended.
    fn evicted_by(&self, seq: u64) -> Option<u64> {
        match *self {
            Self::Ring { capacity } => seq.checked_sub(capacity as u64),
            Self::Unbounded => None,
        }
    }
}

pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    /// Next sequence number. Held for the whole append so persistence order
    /// matches insertion order.
    writer: Mutex<u64>,
    retention: Retention,
    backend: Arc<dyn StateBackend>,
}

impl AuditLog {
    pub fn new(retention: Retention, backend: Arc<dyn StateBackend>) -> Result<Self> {
        retention.validate()?;
        Ok(Self {
            entries: RwLock::new(VecDeque::new()),
            writer: Mutex::new(0),
            retention,
            backend,
        })
    }

    /// Rebuild from previously persisted entries (already in `seq` order).
    /// Entries outside the ring are dropped from the backend too.
    pub fn restore(
        retention: Retention,
        backend: Arc<dyn StateBackend>,
        persisted: Vec<AuditEntry>,
    ) -> Result<Self> {
        let log = Self::new(retention, backend)?;
        let next = {
            let mut next = log.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let mut entries = log.entries.write().unwrap_or_else(PoisonError::into_inner);
            for entry in persisted {
                *next = entry.seq + 1;
                log.push(&mut entries, entry);
            }
            *next
        };
        if let Retention::Ring { capacity } = retention {
            log.backend.prune_audit(next.saturating_sub(capacity as u64))?;
        }
        Ok(log)
    }

    /// Persist and record an entry. Fails only if the backend does.
    pub fn append(&self, entry: AuditEntry) -> Result<AuditEntry> {
        let backend = Arc::clone(&self.backend);
        self.append_with(entry, |e, evict| backend.append_audit(e, evict))
    }

    /// Assign the next `seq`, run `commit` with the finished entry and the
    /// seq it pushes out of the ring, and only if it succeeds make the entry
    /// visible to readers. The seq is consumed exactly when `commit` succeeds.
    pub(crate) fn append_with<F>(&self, mut entry: AuditEntry, commit: F) -> Result<AuditEntry>
    where
        F: FnOnce(&AuditEntry, Option<u64>) -> Result<()>,
    {
        let mut next = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        entry.seq = *next;
        commit(&entry, self.retention.evicted_by(entry.seq))?;
        *next += 1;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.push(&mut entries, entry.clone());
        debug!(seq = entry.seq, store = %entry.store, outcome = ?entry.outcome, "audit entry appended");
        Ok(entry)
    }

    fn push(&self, entries: &mut VecDeque<AuditEntry>, entry: AuditEntry) {
        entries.push_back(entry);
        if let Retention::Ring { capacity } = self.retention {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
    }

    /// Lazily walk the entries present right now, oldest first.
    pub fn query(&self, filter: AuditFilter) -> AuditQuery<'_> {
        let end = *self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        AuditQuery::new(self, filter, end)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<AuditEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}
