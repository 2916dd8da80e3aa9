//! Durable state for stores and the audit trail.
//!
//! Layout (sled trees, big-endian u64 keys, bincode values):
//! - `stores`: handle -> `StoreRecord`
//! - `audit`:  seq    -> `AuditEntry`

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use tracing::debug;

use crate::audit::AuditEntry;
use crate::error::{Result, VaultError};
use crate::vault::{StoreHandle, StoreRecord};

const STORES_TREE: &str = "stores";
const AUDIT_TREE: &str = "audit";

/// Where stores and audit entries are persisted.
///
/// Each write call is the commit point: once it returns `Ok` the change is
/// applied, and on `Err` nothing was. Making it durable is a separate
/// [`flush`](StateBackend::flush).
pub trait StateBackend: Send + Sync {
    fn put_store(&self, handle: StoreHandle, record: &StoreRecord) -> Result<()>;

    /// Write an unlock attempt: the (possibly changed) store record, its
    /// audit entry, and the removal of the audit entry at `evict`, as one unit.
    fn commit_attempt(
        &self,
        handle: StoreHandle,
        record: Option<&StoreRecord>,
        entry: &AuditEntry,
        evict: Option<u64>,
    ) -> Result<()>;

    fn append_audit(&self, entry: &AuditEntry, evict: Option<u64>) -> Result<()>;

    /// Drop every audit entry with `seq < floor`.
    fn prune_audit(&self, floor: u64) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn load_stores(&self) -> Result<Vec<(StoreHandle, StoreRecord)>>;

    fn load_audit(&self) -> Result<Vec<AuditEntry>>;

    /// The exact bytes held in a store's slot, as an outside reader would see them.
    fn raw_slot(&self, handle: StoreHandle) -> Result<Option<Vec<u8>>>;
}

/// No persistence; state lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl StateBackend for MemoryBackend {
    fn put_store(&self, _handle: StoreHandle, _record: &StoreRecord) -> Result<()> {
        Ok(())
    }

    fn commit_attempt(
        &self,
        _handle: StoreHandle,
        _record: Option<&StoreRecord>,
        _entry: &AuditEntry,
        _evict: Option<u64>,
    ) -> Result<()> {
        Ok(())
    }

    fn append_audit(&self, _entry: &AuditEntry, _evict: Option<u64>) -> Result<()> {
        Ok(())
    }

    fn prune_audit(&self, _floor: u64) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn load_stores(&self) -> Result<Vec<(StoreHandle, StoreRecord)>> {
        Ok(Vec::new())
    }

    fn load_audit(&self) -> Result<Vec<AuditEntry>> {
        Ok(Vec::new())
    }

    fn raw_slot(&self, _handle: StoreHandle) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

pub struct Storage {
    db: sled::Db,
    stores: sled::Tree,
    audit: sled::Tree,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening sled DB at '{}'", path.display());
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let stores = db.open_tree(STORES_TREE)?;
        let audit = db.open_tree(AUDIT_TREE)?;
        Ok(Self { db, stores, audit })
    }

    fn scan<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<(u64, T)>> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let key: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| VaultError::StorageFault("corrupt key width".to_string()))?;
            out.push((u64::from_be_bytes(key), bincode::deserialize(&value)?));
        }
        Ok(out)
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }
}

impl StateBackend for Storage {
    fn put_store(&self, handle: StoreHandle, record: &StoreRecord) -> Result<()> {
        self.stores.insert(handle.to_key(), Self::encode(record)?)?;
        Ok(())
    }

    fn commit_attempt(
        &self,
        handle: StoreHandle,
        record: Option<&StoreRecord>,
        entry: &AuditEntry,
        evict: Option<u64>,
    ) -> Result<()> {
        let key = handle.to_key();
        let record = record.map(Self::encode).transpose()?;
        let entry_key = entry.seq.to_be_bytes();
        let entry = Self::encode(entry)?;
        let evict_key = evict.map(u64::to_be_bytes);

        (&self.stores, &self.audit)
            .transaction(|(stores, audit)| {
                if let Some(record) = &record {
                    stores.insert(key.as_slice(), record.as_slice())?;
                }
                audit.insert(entry_key.as_slice(), entry.as_slice())?;
                if let Some(evict_key) = &evict_key {
                    audit.remove(evict_key.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| VaultError::StorageFault(format!("{:?}", e)))?;
        Ok(())
    }

    fn append_audit(&self, entry: &AuditEntry, evict: Option<u64>) -> Result<()> {
        let mut batch = sled::Batch::default();
        batch.insert(entry.seq.to_be_bytes().to_vec(), Self::encode(entry)?);
        if let Some(seq) = evict {
            batch.remove(seq.to_be_bytes().to_vec());
        }
        self.audit.apply_batch(batch)?;
        Ok(())
    }

    fn prune_audit(&self, floor: u64) -> Result<()> {
        let mut batch = sled::Batch::default();
        let mut pruned = 0usize;
        for key in self.audit.range(..floor.to_be_bytes()).keys() {
            batch.remove(key?);
            pruned += 1;
        }
        if pruned > 0 {
            self.audit.apply_batch(batch)?;
            debug!("Pruned {} audit entries below seq {}", pruned, floor);
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn load_stores(&self) -> Result<Vec<(StoreHandle, StoreRecord)>> {
        Ok(Self::scan(&self.stores)?
            .into_iter()
            .map(|(id, record)| (StoreHandle::from_raw(id), record))
            .collect())
    }

    fn load_audit(&self) -> Result<Vec<AuditEntry>> {
        Ok(Self::scan(&self.audit)?.into_iter().map(|(_, entry)| entry).collect())
    }

    fn raw_slot(&self, handle: StoreHandle) -> Result<Option<Vec<u8>>> {
        Ok(self.stores.get(handle.to_key())?.map(|v| v.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Operation, Principal};
    use crate::audit::Outcome;
    use crate::crypto::SecretCommitment;
    use crate::vault::LockState;

    fn record(state: LockState) -> StoreRecord {
        StoreRecord {
            commitment: SecretCommitment::derive(b"vault is locked with password"),
            lock_state: state,
            owner: Principal::parse("alice").unwrap(),
        }
    }

    fn entry(seq: u64, handle: StoreHandle) -> AuditEntry {
        let mut e = AuditEntry::new(
            handle,
            Principal::parse("alice").unwrap(),
            Operation::Unlock,
            Outcome::Success,
            LockState::Unlocked,
            true,
        );
        e.seq = seq;
        e
    }

    #[test]
    fn test_commit_attempt_writes_both_trees() {
        let storage = Storage::temporary().unwrap();
        let h = StoreHandle::from_raw(3);
        storage.put_store(h, &record(LockState::Locked)).unwrap();
        storage
            .commit_attempt(h, Some(&record(LockState::Unlocked)), &entry(0, h), None)
            .unwrap();

        let stores = storage.load_stores().unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].0, h);
        assert_eq!(stores[0].1.lock_state, LockState::Unlocked);

        let audit = storage.load_audit().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].store, h);
    }

    #[test]
    fn test_audit_loads_in_seq_order() {
        let storage = Storage::temporary().unwrap();
        let h = StoreHandle::from_raw(0);
        for seq in [2u64, 0, 300, 1] {
            storage.append_audit(&entry(seq, h), None).unwrap();
        }
        let seqs: Vec<u64> = storage.load_audit().unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 300]);
    }

    #[test]
    fn test_evict_and_prune_remove_old_entries() {
        let storage = Storage::temporary().unwrap();
        let h = StoreHandle::from_raw(0);
        for seq in 0..4u64 {
            storage.append_audit(&entry(seq, h), None).unwrap();
        }
        storage
            .commit_attempt(h, None, &entry(4, h), Some(0))
            .unwrap();
        storage.append_audit(&entry(5, h), Some(1)).unwrap();
        let seqs: Vec<u64> = storage.load_audit().unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4, 5]);

        storage.prune_audit(4).unwrap();
        let seqs: Vec<u64> = storage.load_audit().unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn test_reopen_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let h = StoreHandle::from_raw(0);
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.put_store(h, &record(LockState::Locked)).unwrap();
            storage.flush().unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        let stores = storage.load_stores().unwrap();
        assert_eq!(stores[0].1, record(LockState::Locked));
    }

    #[test]
    fn test_raw_slot_holds_no_plaintext() {
        let storage = Storage::temporary().unwrap();
        let h = StoreHandle::from_raw(0);
        storage.put_store(h, &record(LockState::Locked)).unwrap();
        let raw = storage.raw_slot(h).unwrap().unwrap();
        let needle = b"vault is locked";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
        assert!(storage.raw_slot(StoreHandle::from_raw(9)).unwrap().is_none());
    }
}
