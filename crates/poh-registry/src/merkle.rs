//! # Registry State Root
//!
//! A Merkle tree over every committed entry. The root summarizes the whole
//! registry in 32 bytes; an inclusion proof shows that one identity is bound
//! to one commitment under that root without shipping the other entries.
//!
//! ## Threat Model
//!
//! - **Tamper Evidence**: Rewriting any stored entry changes the root.
//! - **Efficient Proofs**: O(log n) proof size for n entries.
//! - **Distributed Trust**: The root can be published or pinned independently.
//!
//! ## Leaves
//!
//! ```text
//! leaf = SHA-256("POH-LEAF-V1" || storage_key || commitment)
//! node = SHA-256(left || right)
//! ```
//!
//! Leaves are ordered by identity storage key, so the root is independent of
//! commit order. An odd node at any level is paired with itself.
//!
//! ## References
//!
//! - **Merkle, R. C. (1979)** - "Secrecy, Authentication, and Public Key Systems"
//!   <https://www.ralphmerkle.com/papers/Thesis1979.pdf>
//! - **RFC 6962** - Certificate Transparency (modern Merkle tree usage)
//!   <https://www.rfc-editor.org/rfc/rfc6962>

use crate::models::{Commitment, Hash, Identity, MerkleProof, MerkleProofNode, HASH_SIZE};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Root of an empty registry.
pub const EMPTY_HASH: Hash = [0u8; HASH_SIZE];

/// Domain tag for leaf hashes.
pub const LEAF_DOMAIN_TAG: &[u8] = b"POH-LEAF-V1";

/// A Merkle tree over registry entries.
///
/// Entries can only be added, mirroring the registry itself.
///
/// # Example
///
/// ```rust
/// use poh_registry::merkle::MerkleTree;
/// use poh_registry::{Commitment, Identity};
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2023, 10, 25).unwrap();
/// let mut tree = MerkleTree::new();
/// tree.insert(&Identity::new("AAPL", date).unwrap(), &Commitment::from_bytes([1u8; 32]));
/// tree.insert(&Identity::new("MSFT", date).unwrap(), &Commitment::from_bytes([2u8; 32]));
///
/// let root = tree.get_root();
/// let proof = tree.get_proof(&Identity::new("AAPL", date).unwrap()).unwrap();
/// assert!(MerkleTree::verify_proof(&proof, &root));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// Leaf hashes indexed by identity storage key.
    leaves: BTreeMap<String, Hash>,

    /// Cached root hash (invalidated on insertion).
    cached_root: Option<Hash>,
}

impl MerkleTree {
    /// Creates an empty tree. Its root is [`EMPTY_HASH`].
    pub fn new() -> Self {
        MerkleTree {
            leaves: BTreeMap::new(),
            cached_root: None,
        }
    }

    /// Adds an entry's leaf.
    pub fn insert(&mut self, identity: &Identity, commitment: &Commitment) {
        self.leaves
            .insert(identity.storage_key(), leaf_hash(identity, commitment));
        self.cached_root = None;
    }

    /// Returns the number of leaves in the tree.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Returns true if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Computes (or returns the cached) root hash.
    pub fn get_root(&mut self) -> Hash {
        if let Some(cached) = self.cached_root {
            return cached;
        }

        let hashes: Vec<Hash> = self.leaves.values().copied().collect();
        let root = build_tree(&hashes);
        self.cached_root = Some(root);
        root
    }

    /// Generates an inclusion proof for an identity.
    ///
    /// # Returns
    ///
    /// A `MerkleProof` if the identity has a leaf, None otherwise.
    pub fn get_proof(&mut self, identity: &Identity) -> Option<MerkleProof> {
        let key = identity.storage_key();
        let leaf_hash = *self.leaves.get(&key)?;
        let root_hash = self.get_root();

        let index = self.leaves.keys().position(|k| *k == key)?;
        let hashes: Vec<Hash> = self.leaves.values().copied().collect();
        let path = build_proof_path(&hashes, index);

        Some(MerkleProof {
            leaf_hash,
            path,
            root_hash,
        })
    }

    /// Verifies a proof against a trusted root hash.
    ///
    /// # Security Notes
    ///
    /// The `expected_root` must come from a trusted source. Pair this with
    /// [`MerkleTree::proves`] to also bind the proof to a specific entry.
    pub fn verify_proof(proof: &MerkleProof, expected_root: &Hash) -> bool {
        let mut current = proof.leaf_hash;

        for node in &proof.path {
            current = if node.is_left {
                hash_pair(&node.hash, &current)
            } else {
                hash_pair(&current, &node.hash)
            };
        }

        current == *expected_root
    }

    /// True if `proof` is for exactly this identity and commitment.
    pub fn proves(proof: &MerkleProof, identity: &Identity, commitment: &Commitment) -> bool {
        proof.leaf_hash == leaf_hash(identity, commitment)
    }
}

/// Leaf hash binding an identity to its commitment.
pub fn leaf_hash(identity: &Identity, commitment: &Commitment) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(LEAF_DOMAIN_TAG);
    hasher.update(identity.storage_key().as_bytes());
    hasher.update(commitment.as_bytes());
    hasher.finalize().into()
}

fn build_tree(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return EMPTY_HASH;
    }

    let mut current_level = hashes.to_vec();
    while current_level.len() > 1 {
        current_level = next_level(&current_level);
    }
    current_level[0]
}

fn build_proof_path(hashes: &[Hash], leaf_index: usize) -> Vec<MerkleProofNode> {
    let mut path = Vec::new();
    let mut current_level = hashes.to_vec();
    let mut index = leaf_index;

    while current_level.len() > 1 {
        let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };

        // Odd count: the last node is paired with itself.
        let sibling_hash = if sibling_index < current_level.len() {
            current_level[sibling_index]
        } else {
            current_level[index]
        };

        path.push(MerkleProofNode {
            hash: sibling_hash,
            is_left: index % 2 == 1,
        });

        current_level = next_level(&current_level);
        index /= 2;
    }

    path
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|chunk| match chunk {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn id(entity: &str, day: u32) -> Identity {
        Identity::new(entity, NaiveDate::from_ymd_opt(2023, 10, day).unwrap()).unwrap()
    }

    fn c(byte: u8) -> Commitment {
        Commitment::from_bytes([byte; 32])
    }

    #[test]
    fn test_empty_tree() {
        let mut tree = MerkleTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.get_root(), EMPTY_HASH);
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let mut tree = MerkleTree::new();
        tree.insert(&id("AAPL", 25), &c(1));
        assert_eq!(tree.get_root(), leaf_hash(&id("AAPL", 25), &c(1)));
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let mut a = MerkleTree::new();
        a.insert(&id("AAPL", 25), &c(1));
        a.insert(&id("MSFT", 26), &c(2));
        a.insert(&id("GOOG", 27), &c(3));

        let mut b = MerkleTree::new();
        b.insert(&id("GOOG", 27), &c(3));
        b.insert(&id("AAPL", 25), &c(1));
        b.insert(&id("MSFT", 26), &c(2));

        assert_eq!(a.get_root(), b.get_root());
    }

    #[test]
    fn test_root_changes_with_insertion() {
        let mut tree = MerkleTree::new();
        tree.insert(&id("AAPL", 25), &c(1));
        let r1 = tree.get_root();
        tree.insert(&id("AAPL", 26), &c(1));
        assert_ne!(r1, tree.get_root());
    }

    #[test]
    fn test_proofs_for_every_leaf() {
        let mut tree = MerkleTree::new();
        for day in 1..=7 {
            tree.insert(&id("AAPL", day), &c(day as u8));
        }
        let root = tree.get_root();

        for day in 1..=7 {
            let proof = tree.get_proof(&id("AAPL", day)).unwrap();
            assert!(MerkleTree::verify_proof(&proof, &root));
            assert!(MerkleTree::proves(&proof, &id("AAPL", day), &c(day as u8)));
            assert!(!MerkleTree::proves(&proof, &id("AAPL", day), &c(0xff)));
        }
    }

    #[test]
    fn test_proof_fails_with_wrong_root() {
        let mut tree = MerkleTree::new();
        tree.insert(&id("AAPL", 25), &c(1));
        tree.insert(&id("MSFT", 25), &c(2));

        let proof = tree.get_proof(&id("AAPL", 25)).unwrap();
        assert!(!MerkleTree::verify_proof(&proof, &EMPTY_HASH));
    }

    #[test]
    fn test_proof_not_found() {
        let mut tree = MerkleTree::new();
        tree.insert(&id("AAPL", 25), &c(1));
        assert!(tree.get_proof(&id("GOOG", 25)).is_none());
    }
}
