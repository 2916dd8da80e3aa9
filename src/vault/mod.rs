//! Store arena
//!
//! `Vault` owns every store created in this process together with the
//! shared audit log and backend. Callers address stores through the opaque
//! [`StoreHandle`] returned by [`Vault::create`].

pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::access::{AuthResult, Operation, OperationKind, Principal};
use crate::audit::{AuditEntry, AuditFilter, AuditLog, Retention};
use crate::config::VaultConfig;
use crate::crypto::SecretCommitment;
use crate::error::{Result, VaultError};
use crate::storage::{MemoryBackend, StateBackend, Storage};

pub use store::{LockState, SecretStore, StoreRecord, UnlockResult};

/// Opaque reference to a store inside one [`Vault`]. Never reused.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(u64);

impl StoreHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub(crate) fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Vault {
    stores: RwLock<Vec<Arc<SecretStore>>>,
    audit: AuditLog,
    backend: Arc<dyn StateBackend>,
}

impl Vault {
    /// Purely in-memory vault.
    pub fn in_memory(retention: Retention) -> Result<Self> {
        let backend: Arc<dyn StateBackend> = Arc::new(MemoryBackend);
        Ok(Self {
            stores: RwLock::new(Vec::new()),
            audit: AuditLog::new(retention, Arc::clone(&backend))?,
            backend,
        })
    }

    /// Load every persisted store and audit entry from `backend`.
    pub fn with_backend(backend: Arc<dyn StateBackend>, retention: Retention) -> Result<Self> {
        retention.validate()?;
        let mut stores = Vec::new();
        for (handle, record) in backend.load_stores()? {
            // Handles are dense indices; a gap means the slot table is damaged.
            if handle.id() != stores.len() as u64 {
                return Err(VaultError::StorageFault(format!(
                    "store table has a gap before {}",
                    handle
                )));
            }
            stores.push(Arc::new(SecretStore::from_record(handle, record)));
        }
        let audit = AuditLog::restore(retention, Arc::clone(&backend), backend.load_audit()?)?;
        info!("Loaded {} store(s), {} audit entries", stores.len(), audit.len());
        Ok(Self {
            stores: RwLock::new(stores),
            audit,
            backend,
        })
    }

    /// Build a vault from config: sled at `storage.path`, or memory only.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let retention = config.audit.retention;
        if config.storage.in_memory {
            return Self::in_memory(retention);
        }
        let storage = Storage::open(&config.storage.path)?;
        Self::with_backend(Arc::new(storage), retention)
    }

    /// Create a new store, Locked, owned by `owner`.
    ///
    /// The record is persisted before the handle is handed out; on a storage
    /// fault no store exists.
    pub fn create(&self, commitment: SecretCommitment, owner: Principal) -> Result<StoreHandle> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        let handle = StoreHandle(stores.len() as u64);
        let store = SecretStore::new(handle, commitment, owner);
        self.backend.put_store(handle, &store.record())?;
        info!(store = %handle, owner = %store.guard().owner(), "Store created");
        stores.push(Arc::new(store));
        store::flush_committed(self.backend.as_ref());
        Ok(handle)
    }

    fn get(&self, handle: StoreHandle) -> Result<Arc<SecretStore>> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| stores.get(i))
            .cloned()
            .ok_or(VaultError::UnknownStore(handle))
    }

    pub fn try_unlock(
        &self,
        handle: StoreHandle,
        principal: &Principal,
        candidate: &[u8],
    ) -> Result<UnlockResult> {
        self.get(handle)?
            .try_unlock(principal, candidate, &self.audit, self.backend.as_ref())
    }

    /// Unlock with a caller identifier that has not been resolved yet.
    ///
    /// An identifier that does not parse is denied and the denial is
    /// audited, the same as any other non-owner.
    pub fn try_unlock_raw(
        &self,
        handle: StoreHandle,
        raw_caller: &str,
        candidate: &[u8],
    ) -> Result<UnlockResult> {
        let store = self.get(handle)?;
        match Principal::parse(raw_caller) {
            Ok(principal) => {
                store.try_unlock(&principal, candidate, &self.audit, self.backend.as_ref())
            }
            Err(_) => store.deny_unresolved(raw_caller, &self.audit, self.backend.as_ref()),
        }
    }

    pub fn is_locked(&self, handle: StoreHandle) -> Result<bool> {
        Ok(self.get(handle)?.is_locked())
    }

    pub fn authorize(
        &self,
        handle: StoreHandle,
        principal: &Principal,
        kind: OperationKind,
    ) -> Result<AuthResult> {
        Ok(self.get(handle)?.guard().authorize(principal, kind))
    }

    /// Like [`Vault::authorize`], but denies identifiers that do not resolve.
    pub fn authorize_raw(
        &self,
        handle: StoreHandle,
        raw_caller: &str,
        kind: OperationKind,
    ) -> Result<AuthResult> {
        Ok(self.get(handle)?.guard().authorize_raw(raw_caller, kind))
    }

    /// Snapshot of a store's persisted layout.
    pub fn record(&self, handle: StoreHandle) -> Result<StoreRecord> {
        Ok(self.get(handle)?.record())
    }

    /// What an outside reader of the backend sees for this store.
    pub fn raw_slot(&self, handle: StoreHandle) -> Result<Option<Vec<u8>>> {
        self.get(handle)?;
        self.backend.raw_slot(handle)
    }

    /// Audit entries for one store, owner only. `None` when denied.
    pub fn read_audit(
        &self,
        handle: StoreHandle,
        principal: &Principal,
        filter: AuditFilter,
    ) -> Result<Option<Vec<AuditEntry>>> {
        let store = self.get(handle)?;
        if !store.guard().authorize(principal, Operation::ReadAudit.kind()).is_permit() {
            return Ok(None);
        }
        Ok(Some(self.audit.query(filter.store(handle)).collect()))
    }

    /// Make every committed change durable.
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn len(&self) -> usize {
        self.stores.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
