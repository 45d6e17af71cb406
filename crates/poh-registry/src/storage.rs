//! # Persistent Storage Layer
//!
//! Sled-backed, append-only persistence for one registry. The only mutation
//! the layer exposes is insert-if-absent; there is no update and no removal.
//!
//! ## Threat Model
//!
//! The storage layer defends against:
//!
//! - **Lost Races**: Entry insertion and event append run in one serializable
//!   sled transaction that aborts if the key exists, so two writers racing for
//!   the same identity can never both succeed. sled holds an exclusive lock on
//!   the database directory, so every writer shares one process and one `Db`.
//! - **Data Loss**: Sled's log-structured storage survives crashes; `flush`
//!   forces durability at run boundaries.
//! - **Silent Corruption**: Stored values are length-checked and decoded on
//!   read; anything malformed surfaces as `RegistryError::CorruptEntry`.
//!
//! ## Storage Structure
//!
//! Each registry lives in its own namespace (a contract address, or `default`):
//!
//! | Tree | Key | Value | Purpose |
//! |------|-----|-------|---------|
//! | `{ns}/meta` | `owner` | principal string | Ownership |
//! | `{ns}/entries` | `ENTITY/yyyymmdd` | 32-byte commitment | The mapping |
//! | `{ns}/events` | u64 big-endian sequence | JSON `CommitEvent` | Audit log |
//!
//! ## References
//!
//! - Sled documentation: <https://sled.rs/>

use crate::models::{CommitEvent, Commitment, Identity, Principal, RegistryError, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

/// Namespace used when a database holds a single registry.
pub const DEFAULT_NAMESPACE: &str = "default";

const OWNER_KEY: &[u8] = b"owner";

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry and its event were written.
    Inserted,
    /// The key already had an entry; nothing was written.
    Exists,
}

/// Wrapper around the sled trees of one registry namespace.
///
/// # Thread Safety
///
/// The underlying Sled database is thread-safe. Cloning a `Storage` shares
/// the same trees.
///
/// # Example
///
/// ```rust
/// use poh_registry::storage::Storage;
/// use poh_registry::Principal;
///
/// let storage = Storage::temporary().unwrap();
/// assert!(storage.load_owner().unwrap().is_none());
/// assert!(storage.init_owner(&Principal::new("alice")).unwrap().is_ok());
/// ```
#[derive(Clone)]
pub struct Storage {
    /// The underlying Sled database.
    db: sled::Db,

    /// Namespace of this registry.
    namespace: String,

    /// Ownership metadata.
    meta: sled::Tree,

    /// Identity -> commitment mapping.
    entries: sled::Tree,

    /// Sequence -> commit event log.
    events: sled::Tree,
}

impl Storage {
    /// Opens or creates a storage database at the given path, using the
    /// default namespace.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Database` if the path is invalid, permissions
    /// are insufficient, or the database is corrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::in_db(&db, DEFAULT_NAMESPACE)
    }

    /// Creates a temporary in-memory storage for testing.
    ///
    /// Data is lost when the last clone is dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::in_db(&db, DEFAULT_NAMESPACE)
    }

    /// Opens the trees of `namespace` inside an already-open database.
    ///
    /// A ledger hosting several registries gives each one its own namespace.
    pub fn in_db(db: &sled::Db, namespace: &str) -> Result<Self> {
        Ok(Storage {
            db: db.clone(),
            namespace: namespace.to_string(),
            meta: db.open_tree(format!("{}/meta", namespace))?,
            entries: db.open_tree(format!("{}/entries", namespace))?,
            events: db.open_tree(format!("{}/events", namespace))?,
        })
    }

    /// The namespace this storage reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Loads the owner, if one was ever set.
    pub fn load_owner(&self) -> Result<Option<Principal>> {
        match self.meta.get(OWNER_KEY)? {
            Some(bytes) => {
                let name = String::from_utf8(bytes.to_vec())
                    .map_err(|_| RegistryError::CorruptEntry("owner is not UTF-8".to_string()))?;
                Ok(Some(Principal::new(name)))
            }
            None => Ok(None),
        }
    }

    /// Sets the owner if none is set.
    ///
    /// # Returns
    ///
    /// `Ok(Ok(()))` if this call set the owner, `Ok(Err(existing))` if an
    /// owner was already present.
    pub fn init_owner(&self, owner: &Principal) -> Result<std::result::Result<(), Principal>> {
        let swapped = self.meta.compare_and_swap(
            OWNER_KEY,
            None::<&[u8]>,
            Some(owner.as_str().as_bytes()),
        )?;

        match swapped {
            Ok(()) => Ok(Ok(())),
            Err(_) => {
                let existing = self.load_owner()?.ok_or_else(|| {
                    RegistryError::CorruptEntry("owner vanished after failed swap".to_string())
                })?;
                Ok(Err(existing))
            }
        }
    }

    /// Inserts an entry and its commit event, unless the identity exists.
    ///
    /// Both writes happen in one transaction; either both land or neither.
    pub fn insert_once(&self, event: &CommitEvent) -> Result<InsertOutcome> {
        let key = event.identity.storage_key();
        let event_key = event.sequence.to_be_bytes().to_vec();
        let event_bytes = serde_json::to_vec(event)?;
        let commitment = event.commitment;

        let result: std::result::Result<(), TransactionError<()>> = (&self.entries, &self.events)
            .transaction(|(entries, events)| {
                if entries.get(key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                entries.insert(key.as_bytes(), &commitment.as_bytes()[..])?;
                events.insert(event_key.as_slice(), event_bytes.as_slice())?;
                Ok(())
            });

        match result {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(TransactionError::Abort(())) => Ok(InsertOutcome::Exists),
            Err(TransactionError::Storage(e)) => Err(RegistryError::Database(e)),
        }
    }

    /// Loads the commitment stored for an identity.
    pub fn load_commitment(&self, identity: &Identity) -> Result<Option<Commitment>> {
        match self.entries.get(identity.storage_key().as_bytes())? {
            Some(bytes) => Commitment::from_slice(&bytes).map(Some).ok_or_else(|| {
                RegistryError::CorruptEntry(format!(
                    "{}: stored commitment has {} bytes",
                    identity,
                    bytes.len()
                ))
            }),
            None => Ok(None),
        }
    }

    /// Checks if an identity has an entry.
    pub fn contains(&self, identity: &Identity) -> Result<bool> {
        Ok(self.entries.contains_key(identity.storage_key().as_bytes())?)
    }

    /// Lists every entry in storage-key order.
    pub fn list_entries(&self) -> Result<Vec<(Identity, Commitment)>> {
        let mut out = Vec::with_capacity(self.entries.len());

        for item in self.entries.iter() {
            let (key, value) = item?;
            let key = std::str::from_utf8(&key)
                .map_err(|_| RegistryError::CorruptEntry("entry key is not UTF-8".to_string()))?;
            let identity = Identity::from_storage_key(key)?;
            let commitment = Commitment::from_slice(&value).ok_or_else(|| {
                RegistryError::CorruptEntry(format!("{}: bad commitment length", identity))
            })?;
            out.push((identity, commitment));
        }

        Ok(out)
    }

    /// Lists the commit event log in sequence order.
    pub fn list_events(&self) -> Result<Vec<CommitEvent>> {
        let mut out = Vec::with_capacity(self.events.len());
        for item in self.events.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Allocates the next event sequence number.
    ///
    /// Numbers are strictly increasing but may have gaps (an allocated number
    /// is not reused when its commit is rejected).
    pub fn next_sequence(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Returns the number of committed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Returns
    ///
    /// The number of bytes flushed.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("namespace", &self.namespace)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn event(entity: &str, seq: u64, byte: u8) -> CommitEvent {
        CommitEvent {
            sequence: seq,
            identity: Identity::new(entity, NaiveDate::from_ymd_opt(2023, 10, 25).unwrap())
                .unwrap(),
            commitment: Commitment::from_bytes([byte; 32]),
            caller: Principal::new("owner"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_temporary_storage() {
        let storage = Storage::temporary().unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.namespace(), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_owner_set_once() {
        let storage = Storage::temporary().unwrap();
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");

        assert_eq!(storage.init_owner(&alice).unwrap(), Ok(()));
        assert_eq!(storage.init_owner(&bob).unwrap(), Err(alice.clone()));
        assert_eq!(storage.load_owner().unwrap(), Some(alice));
    }

    #[test]
    fn test_insert_once_and_load() {
        let storage = Storage::temporary().unwrap();
        let ev = event("AAPL", 1, 7);

        assert_eq!(storage.insert_once(&ev).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            storage.load_commitment(&ev.identity).unwrap(),
            Some(Commitment::from_bytes([7; 32]))
        );
        assert!(storage.contains(&ev.identity).unwrap());
    }

    #[test]
    fn test_second_insert_is_rejected_and_writes_nothing() {
        let storage = Storage::temporary().unwrap();
        storage.insert_once(&event("AAPL", 1, 7)).unwrap();

        let again = event("AAPL", 2, 9);
        assert_eq!(storage.insert_once(&again).unwrap(), InsertOutcome::Exists);

        assert_eq!(
            storage.load_commitment(&again.identity).unwrap(),
            Some(Commitment::from_bytes([7; 32]))
        );
        assert_eq!(storage.list_events().unwrap().len(), 1);
    }

    #[test]
    fn test_list_entries_and_events() {
        let storage = Storage::temporary().unwrap();
        storage.insert_once(&event("MSFT", 2, 2)).unwrap();
        storage.insert_once(&event("AAPL", 5, 1)).unwrap();

        let entries = storage.list_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.entity_id(), "AAPL");
        assert_eq!(entries[1].0.entity_id(), "MSFT");

        let events = storage.list_events().unwrap();
        assert_eq!(events[0].sequence, 2);
        assert_eq!(events[1].sequence, 5);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let a = Storage::in_db(&db, "0xaaaa").unwrap();
        let b = Storage::in_db(&db, "0xbbbb").unwrap();

        a.insert_once(&event("AAPL", 1, 1)).unwrap();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
        assert_eq!(b.insert_once(&event("AAPL", 2, 2)).unwrap(), InsertOutcome::Inserted);
    }

    #[test]
    fn test_sequences_increase() {
        let storage = Storage::temporary().unwrap();
        let first = storage.next_sequence().unwrap();
        let second = storage.next_sequence().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let ev = event("AAPL", 1, 3);

        {
            let storage = Storage::open(&path).unwrap();
            storage.init_owner(&Principal::new("alice")).unwrap().unwrap();
            storage.insert_once(&ev).unwrap();
            storage.flush().unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.load_owner().unwrap(), Some(Principal::new("alice")));
        assert_eq!(
            storage.load_commitment(&ev.identity).unwrap(),
            Some(ev.commitment)
        );
    }
}
