//! # Registry - Main Facade
//!
//! The write-once commitment registry. This is the state machine the ledger
//! executes: a single immutable owner, and a mapping from record identity to
//! commitment in which every entry is created exactly once.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | History rewrite | `commit` rejects any identity that already has an entry, owner included |
//! | Unauthorized writer | Every mutating call compares the caller with the stored owner |
//! | Ownership hijack | `initialize` succeeds once; there is no transfer operation |
//! | Write race | Insert-if-absent is a single storage transaction |
//!
//! ## State Machine
//!
//! ```text
//!              commit (owner, first time)
//!   ┌────────┐ ─────────────────────────▶ ┌───────────┐
//!   │ Absent │                            │ Committed │ ◀─┐
//!   └────────┘                            └───────────┘   │ commit: AlreadyCommitted
//!                                               └─────────┘
//! ```
//!
//! ## Usage Flow
//!
//! 1. **Creation**: open the registry and `initialize` it with its owner
//! 2. **Commit**: the owner commits `(identity, commitment)` pairs
//! 3. **Read**: anyone calls `get` to fetch a stored commitment
//! 4. **Audit**: `events`, `state_root` and `inclusion_proof` expose history

use crate::merkle::MerkleTree;
use crate::models::{
    CommitEvent, Commitment, EntryState, Hash, Identity, MerkleProof, Principal, RegistryError,
    Result,
};
use crate::storage::{InsertOutcome, Storage};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

/// The commitment registry.
///
/// All operations take `&self`; the registry can be shared behind an `Arc`
/// and used from several threads. Serialization of conflicting writes is
/// provided by the storage transaction, not by the caller.
///
/// # Example
///
/// ```rust
/// use poh_registry::{Commitment, Identity, Principal, Registry, RegistryError};
/// use chrono::NaiveDate;
///
/// let registry = Registry::temporary().unwrap();
/// let owner = Principal::new("oracle");
/// registry.initialize(&owner).unwrap();
///
/// let id = Identity::new("AAPL", NaiveDate::from_ymd_opt(2023, 10, 25).unwrap()).unwrap();
/// let h1 = Commitment::from_bytes([1u8; 32]);
/// registry.commit(&owner, &id, h1).unwrap();
///
/// // Write-once: even the owner cannot overwrite.
/// let err = registry.commit(&owner, &id, Commitment::from_bytes([2u8; 32])).unwrap_err();
/// assert!(matches!(err, RegistryError::AlreadyCommitted(_)));
/// assert_eq!(registry.get(&id).unwrap(), Some(h1));
/// ```
#[derive(Clone)]
pub struct Registry {
    /// Persistent storage for owner, entries and events.
    storage: Storage,
}

impl Registry {
    /// Opens or creates a registry database at `path`.
    ///
    /// The registry is uninitialized until [`Registry::initialize`] is called
    /// on a fresh database.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Database` if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Registry {
            storage: Storage::open(path)?,
        })
    }

    /// Creates a temporary in-memory registry for testing.
    pub fn temporary() -> Result<Self> {
        Ok(Registry {
            storage: Storage::temporary()?,
        })
    }

    /// Wraps existing storage (used by ledgers hosting many registries).
    pub fn with_storage(storage: Storage) -> Self {
        Registry { storage }
    }

    /// Sets the immutable owner.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyInitialized` on every call after the
    /// first, whoever the caller is.
    pub fn initialize(&self, owner: &Principal) -> Result<()> {
        match self.storage.init_owner(owner)? {
            Ok(()) => {
                info!(namespace = self.storage.namespace(), %owner, "registry initialized");
                Ok(())
            }
            Err(existing) => Err(RegistryError::AlreadyInitialized { owner: existing }),
        }
    }

    /// The owner, or `None` before initialization.
    pub fn owner(&self) -> Result<Option<Principal>> {
        self.storage.load_owner()
    }

    /// Commits `commitment` for `identity`, timestamped now.
    ///
    /// See [`Registry::commit_at`].
    pub fn commit(
        &self,
        caller: &Principal,
        identity: &Identity,
        commitment: Commitment,
    ) -> Result<CommitEvent> {
        self.commit_at(caller, identity, commitment, Utc::now())
    }

    /// Commits `commitment` for `identity` with an explicit timestamp
    /// (a ledger passes its block time).
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if the registry has no owner
    /// - `Unauthorized` if `caller` is not the owner
    /// - `AlreadyCommitted` if the identity already has an entry, regardless
    ///   of caller and of whether the commitment is equal
    ///
    /// A rejected call leaves state untouched.
    pub fn commit_at(
        &self,
        caller: &Principal,
        identity: &Identity,
        commitment: Commitment,
        timestamp: DateTime<Utc>,
    ) -> Result<CommitEvent> {
        let owner = self.storage.load_owner()?.ok_or(RegistryError::NotInitialized)?;
        if *caller != owner {
            return Err(RegistryError::Unauthorized {
                caller: caller.clone(),
                owner,
            });
        }

        let event = CommitEvent {
            sequence: self.storage.next_sequence()?,
            identity: identity.clone(),
            commitment,
            caller: caller.clone(),
            timestamp,
        };

        match self.storage.insert_once(&event)? {
            InsertOutcome::Inserted => {
                info!(%identity, %commitment, sequence = event.sequence, "entry committed");
                Ok(event)
            }
            InsertOutcome::Exists => {
                debug!(%identity, "commit rejected: identity already committed");
                Err(RegistryError::AlreadyCommitted(identity.clone()))
            }
        }
    }

    /// Reads the stored commitment. Public; never fails on authorization.
    pub fn get(&self, identity: &Identity) -> Result<Option<Commitment>> {
        self.storage.load_commitment(identity)
    }

    /// The automaton state of an identity.
    pub fn state(&self, identity: &Identity) -> Result<EntryState> {
        Ok(match self.get(identity)? {
            Some(c) => EntryState::Committed(c),
            None => EntryState::Absent,
        })
    }

    /// Checks if an identity has been committed.
    pub fn contains(&self, identity: &Identity) -> Result<bool> {
        self.storage.contains(identity)
    }

    /// Every entry, ordered by identity.
    pub fn entries(&self) -> Result<Vec<(Identity, Commitment)>> {
        self.storage.list_entries()
    }

    /// The commit event log, oldest first.
    pub fn events(&self) -> Result<Vec<CommitEvent>> {
        self.storage.list_events()
    }

    /// Merkle root over all entries.
    pub fn state_root(&self) -> Result<Hash> {
        Ok(self.merkle_tree()?.get_root())
    }

    /// Inclusion proof of one identity under the current state root.
    pub fn inclusion_proof(&self, identity: &Identity) -> Result<Option<MerkleProof>> {
        Ok(self.merkle_tree()?.get_proof(identity))
    }

    /// Returns the number of committed entries.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()?;
        Ok(())
    }

    fn merkle_tree(&self) -> Result<MerkleTree> {
        let mut tree = MerkleTree::new();
        for (identity, commitment) in self.storage.list_entries()? {
            tree.insert(&identity, &commitment);
        }
        Ok(tree)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("namespace", &self.storage.namespace())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::EMPTY_HASH;
    use chrono::NaiveDate;

    fn id(entity: &str) -> Identity {
        Identity::new(entity, NaiveDate::from_ymd_opt(2023, 10, 25).unwrap()).unwrap()
    }

    fn owned() -> (Registry, Principal) {
        let registry = Registry::temporary().unwrap();
        let owner = Principal::new("owner");
        registry.initialize(&owner).unwrap();
        (registry, owner)
    }

    #[test]
    fn test_initialize_once() {
        let registry = Registry::temporary().unwrap();
        assert_eq!(registry.owner().unwrap(), None);

        registry.initialize(&Principal::new("alice")).unwrap();
        let err = registry.initialize(&Principal::new("bob")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::AlreadyInitialized { owner } if owner.as_str() == "alice"
        ));

        // Re-initializing with the same owner is still rejected.
        assert!(registry.initialize(&Principal::new("alice")).is_err());
        assert_eq!(registry.owner().unwrap(), Some(Principal::new("alice")));
    }

    #[test]
    fn test_commit_requires_initialization() {
        let registry = Registry::temporary().unwrap();
        let err = registry
            .commit(&Principal::new("x"), &id("AAPL"), Commitment::from_bytes([1; 32]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotInitialized));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_commit_and_get() {
        let (registry, owner) = owned();
        let c = Commitment::from_bytes([1; 32]);

        let event = registry.commit(&owner, &id("AAPL"), c).unwrap();
        assert_eq!(event.identity, id("AAPL"));
        assert_eq!(event.commitment, c);
        assert_eq!(event.caller, owner);

        assert_eq!(registry.get(&id("AAPL")).unwrap(), Some(c));
        assert_eq!(registry.state(&id("AAPL")).unwrap(), EntryState::Committed(c));
        assert_eq!(registry.state(&id("GOOG")).unwrap(), EntryState::Absent);
        assert_eq!(registry.get(&id("GOOG")).unwrap(), None);
    }

    #[test]
    fn test_unauthorized_never_mutates() {
        let (registry, _owner) = owned();
        let mallory = Principal::new("mallory");

        let err = registry
            .commit(&mallory, &id("AAPL"), Commitment::from_bytes([1; 32]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
        assert!(registry.is_empty());
        assert!(registry.events().unwrap().is_empty());
    }

    #[test]
    fn test_recommit_same_hash_rejected() {
        let (registry, owner) = owned();
        let c = Commitment::from_bytes([1; 32]);
        registry.commit(&owner, &id("AAPL"), c).unwrap();

        let err = registry.commit(&owner, &id("AAPL"), c).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyCommitted(_)));
        assert_eq!(registry.events().unwrap().len(), 1);
    }

    #[test]
    fn test_unauthorized_checked_before_existence() {
        let (registry, owner) = owned();
        registry
            .commit(&owner, &id("AAPL"), Commitment::from_bytes([1; 32]))
            .unwrap();

        let err = registry
            .commit(&Principal::new("mallory"), &id("AAPL"), Commitment::from_bytes([2; 32]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
    }

    #[test]
    fn test_state_root_and_proof() {
        let (registry, owner) = owned();
        assert_eq!(registry.state_root().unwrap(), EMPTY_HASH);

        let c = Commitment::from_bytes([3; 32]);
        registry.commit(&owner, &id("AAPL"), c).unwrap();
        registry
            .commit(&owner, &id("MSFT"), Commitment::from_bytes([4; 32]))
            .unwrap();

        let root = registry.state_root().unwrap();
        let proof = registry.inclusion_proof(&id("AAPL")).unwrap().unwrap();
        assert!(MerkleTree::verify_proof(&proof, &root));
        assert!(MerkleTree::proves(&proof, &id("AAPL"), &c));
        assert!(registry.inclusion_proof(&id("GOOG")).unwrap().is_none());
    }

    #[test]
    fn test_commit_at_records_timestamp() {
        let (registry, owner) = owned();
        let at = DateTime::parse_from_rfc3339("2023-10-25T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = registry
            .commit_at(&owner, &id("AAPL"), Commitment::from_bytes([5; 32]), at)
            .unwrap();
        assert_eq!(event.timestamp, at);
        assert_eq!(registry.events().unwrap()[0].timestamp, at);
    }
}
