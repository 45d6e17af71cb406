//! # Core Data Models for the Commitment Registry
//!
//! This module defines the fundamental types shared by the registry, the
//! ledger backend and the oracle client. Strong typing keeps identities,
//! commitments and principals from being mixed up with arbitrary strings and
//! byte arrays.
//!
//! ## Threat Model
//!
//! The types in this module help defend against:
//!
//! - **Type Confusion**: A [`Commitment`] is never interchangeable with a raw
//!   hash from another context (Merkle nodes, transaction hashes).
//! - **Identity Smuggling**: [`Identity`] validates its entity token so that
//!   storage keys cannot collide or be forged with separator characters.
//! - **Incomplete Handling**: [`EntryState`] and [`RegistryError`] force callers
//!   to handle every registry outcome explicitly.
//!
//! ## References
//!
//! - NIST FIPS 180-4 for hash size (SHA-256 = 32 bytes)

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SHA-256 hash output size in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 hash value.
pub type Hash = [u8; HASH_SIZE];

/// Maximum length of an entity token (e.g. a ticker symbol).
pub const MAX_ENTITY_LEN: usize = 32;

/// Years an identity may carry; the `yyyymmdd` date code must fit in a u32.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 0..=9999;

/// A commitment: the SHA-256 digest standing in for a record payload.
///
/// Rendered and serialized as `0x`-prefixed lowercase hex.
///
/// # Example
///
/// ```rust
/// use poh_registry::Commitment;
///
/// let c = Commitment::from_bytes([0xab; 32]);
/// let parsed: Commitment = c.to_string().parse().unwrap();
/// assert_eq!(c, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Commitment(Hash);

impl Commitment {
    /// Wraps a raw digest.
    pub const fn from_bytes(bytes: Hash) -> Self {
        Commitment(bytes)
    }

    /// Returns the raw digest.
    pub const fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Parses a commitment from a byte slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let hash: Hash = bytes.try_into().ok()?;
        Some(Commitment(hash))
    }

    /// Hex rendering with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| RegistryError::InvalidCommitment(format!("{}: {}", s, e)))?;
        Commitment::from_slice(&bytes).ok_or_else(|| {
            RegistryError::InvalidCommitment(format!(
                "{}: expected {} bytes, got {}",
                s,
                HASH_SIZE,
                bytes.len()
            ))
        })
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An account allowed to sign transactions against the ledger.
///
/// The registry compares principals by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Creates a principal from any non-empty account name or address.
    pub fn new(name: impl Into<String>) -> Self {
        Principal(name.into())
    }

    /// The principal as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Principal::new(name)
    }
}

/// Composite key naming one historical record: `(entity_id, as_of_date)`.
///
/// The entity token is restricted to 1-32 characters from `[A-Za-z0-9._-]`,
/// which keeps the storage key `ENTITY/yyyymmdd` unambiguous.
///
/// # Example
///
/// ```rust
/// use poh_registry::Identity;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2023, 10, 25).unwrap();
/// let id = Identity::new("AAPL", date).unwrap();
/// assert_eq!(id.date_code(), 20231025);
/// assert_eq!(id.storage_key(), "AAPL/20231025");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawIdentity")]
pub struct Identity {
    entity_id: String,
    as_of_date: NaiveDate,
}

#[derive(Deserialize)]
struct RawIdentity {
    entity_id: String,
    as_of_date: NaiveDate,
}

impl TryFrom<RawIdentity> for Identity {
    type Error = RegistryError;

    fn try_from(raw: RawIdentity) -> Result<Self> {
        Identity::new(raw.entity_id, raw.as_of_date)
    }
}

impl Identity {
    /// Creates a validated identity.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidIdentity` if the entity token is empty,
    /// too long, or contains characters outside `[A-Za-z0-9._-]`, or if the
    /// year falls outside [`YEAR_RANGE`].
    pub fn new(entity_id: impl Into<String>, as_of_date: NaiveDate) -> Result<Self> {
        let entity_id = entity_id.into();
        validate_entity(&entity_id)?;
        if !YEAR_RANGE.contains(&as_of_date.year()) {
            return Err(RegistryError::InvalidIdentity(format!(
                "year {} outside {}..={}",
                as_of_date.year(),
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }
        Ok(Identity {
            entity_id,
            as_of_date,
        })
    }

    /// Builds an identity from an entity token and a `yyyymmdd` date code.
    pub fn from_date_code(entity_id: impl Into<String>, code: u32) -> Result<Self> {
        let date = NaiveDate::from_ymd_opt(
            (code / 10_000) as i32,
            (code / 100) % 100,
            code % 100,
        )
        .ok_or_else(|| RegistryError::InvalidIdentity(format!("bad date code {}", code)))?;
        Identity::new(entity_id, date)
    }

    /// The entity token (e.g. `AAPL`).
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The calendar date of the record.
    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    /// The date as the `yyyymmdd` integer the on-ledger key uses.
    pub fn date_code(&self) -> u32 {
        let d = self.as_of_date;
        (d.year() as u32) * 10_000 + d.month() * 100 + d.day()
    }

    /// Key under which the registry stores this identity.
    pub fn storage_key(&self) -> String {
        format!("{}/{:08}", self.entity_id, self.date_code())
    }

    /// Inverse of [`Identity::storage_key`].
    pub fn from_storage_key(key: &str) -> Result<Self> {
        let (entity, code) = key
            .split_once('/')
            .ok_or_else(|| RegistryError::CorruptEntry(format!("bad identity key {:?}", key)))?;
        let code: u32 = code
            .parse()
            .map_err(|_| RegistryError::CorruptEntry(format!("bad identity key {:?}", key)))?;
        Identity::from_date_code(entity, code)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id, self.as_of_date.format("%Y-%m-%d"))
    }
}

fn validate_entity(entity_id: &str) -> Result<()> {
    if entity_id.is_empty() {
        return Err(RegistryError::InvalidIdentity("empty entity id".to_string()));
    }
    if entity_id.len() > MAX_ENTITY_LEN {
        return Err(RegistryError::InvalidIdentity(format!(
            "entity id {:?} exceeds {} characters",
            entity_id, MAX_ENTITY_LEN
        )));
    }
    if let Some(bad) = entity_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(RegistryError::InvalidIdentity(format!(
            "entity id {:?} contains {:?}",
            entity_id, bad
        )));
    }
    Ok(())
}

/// Per-identity state of the registry automaton.
///
/// `Absent` is initial, `Committed` is terminal. The only transition is
/// `Absent -> Committed` through a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Nothing has been committed for the identity.
    Absent,
    /// The identity is permanently bound to this commitment.
    Committed(Commitment),
}

impl EntryState {
    /// The stored commitment, if any.
    pub fn commitment(&self) -> Option<Commitment> {
        match self {
            EntryState::Absent => None,
            EntryState::Committed(c) => Some(*c),
        }
    }
}

/// Observable record of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Position in the registry's event log (monotonically increasing).
    pub sequence: u64,

    /// The committed identity.
    pub identity: Identity,

    /// The committed hash.
    pub commitment: Commitment,

    /// The principal that submitted the commit (always the owner).
    pub caller: Principal,

    /// When the commit was applied.
    pub timestamp: DateTime<Utc>,
}

/// A node in the Merkle proof path.
///
/// `is_left` tells the verifier whether the sibling is concatenated on the
/// left (true) or right (false).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofNode {
    /// The sibling hash at this tree level.
    pub hash: Hash,

    /// Whether this sibling is on the left of the path.
    pub is_left: bool,
}

/// Proof that one registry entry is included under a state root.
///
/// # Security Notes
///
/// The root must be obtained through a trusted channel (e.g. read from the
/// ledger directly); a proof only ties a leaf to the root it is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash of the proven entry.
    pub leaf_hash: Hash,

    /// Path of sibling hashes from leaf to root.
    pub path: Vec<MerkleProofNode>,

    /// Root hash at the time the proof was generated.
    pub root_hash: Hash,
}

/// Errors that can occur during registry operations.
///
/// `Unauthorized`, `AlreadyCommitted` and `AlreadyInitialized` are the
/// state-machine rejections; the rest are storage or input failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to open or write the database.
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Failed to serialize or deserialize stored data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller is not the registry owner.
    #[error("Unauthorized: {caller} is not the registry owner ({owner})")]
    Unauthorized {
        /// Principal that attempted the write.
        caller: Principal,
        /// The configured owner.
        owner: Principal,
    },

    /// The identity already has a committed entry.
    #[error("Already committed: {0}")]
    AlreadyCommitted(Identity),

    /// `initialize` was called on a registry that already has an owner.
    #[error("Registry already initialized (owner {owner})")]
    AlreadyInitialized {
        /// The existing owner.
        owner: Principal,
    },

    /// The registry has no owner yet.
    #[error("Registry not initialized")]
    NotInitialized,

    /// The identity fields are not acceptable.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A commitment string could not be parsed.
    #[error("Invalid commitment: {0}")]
    InvalidCommitment(String),

    /// Stored bytes do not decode to a valid entry.
    #[error("Corrupt entry: {0}")]
    CorruptEntry(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_identity_validation() {
        assert!(Identity::new("AAPL", date(2023, 10, 25)).is_ok());
        assert!(Identity::new("BRK.B", date(2023, 10, 25)).is_ok());
        assert!(Identity::new("", date(2023, 10, 25)).is_err());
        assert!(Identity::new("AA/PL", date(2023, 10, 25)).is_err());
        assert!(Identity::new("A".repeat(33), date(2023, 10, 25)).is_err());
    }

    #[test]
    fn test_identity_storage_key_roundtrip() {
        let id = Identity::new("MSFT", date(2023, 10, 26)).unwrap();
        assert_eq!(id.storage_key(), "MSFT/20231026");
        assert_eq!(Identity::from_storage_key("MSFT/20231026").unwrap(), id);
        assert!(Identity::from_storage_key("MSFT").is_err());
        assert!(Identity::from_storage_key("MSFT/20231399").is_err());
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new("AAPL", date(2023, 1, 5)).unwrap();
        assert_eq!(id.to_string(), "AAPL@2023-01-05");
        assert_eq!(id.date_code(), 20230105);
    }

    #[test]
    fn test_identity_rejects_years_outside_date_code() {
        let negative = NaiveDate::from_ymd_opt(-1, 1, 1).unwrap();
        let too_far = NaiveDate::from_ymd_opt(10_000, 1, 1).unwrap();
        assert!(matches!(
            Identity::new("AAPL", negative),
            Err(RegistryError::InvalidIdentity(_))
        ));
        assert!(Identity::new("AAPL", too_far).is_err());

        let edge = Identity::new("AAPL", date(9999, 12, 31)).unwrap();
        assert_eq!(edge.date_code(), 99_991_231);
        assert!(serde_json::from_str::<Identity>(
            r#"{"entity_id":"AAPL","as_of_date":"-0001-01-01"}"#
        )
        .is_err());
    }

    #[test]
    fn test_identity_deserialize_rejects_bad_entity() {
        let ok = r#"{"entity_id":"AAPL","as_of_date":"2023-10-25"}"#;
        let bad = r#"{"entity_id":"A PL","as_of_date":"2023-10-25"}"#;
        assert!(serde_json::from_str::<Identity>(ok).is_ok());
        assert!(serde_json::from_str::<Identity>(bad).is_err());
    }

    #[test]
    fn test_commitment_hex() {
        let c = Commitment::from_bytes([0x0f; 32]);
        assert_eq!(c.to_hex(), format!("0x{}", "0f".repeat(32)));
        assert_eq!(c.to_hex().parse::<Commitment>().unwrap(), c);
        assert!("0x1234".parse::<Commitment>().is_err());
        assert!("zz".parse::<Commitment>().is_err());
    }

    #[test]
    fn test_commitment_serde_as_string() {
        let c = Commitment::from_bytes([1u8; 32]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "01".repeat(32)));
        let back: Commitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_entry_state() {
        let c = Commitment::from_bytes([2u8; 32]);
        assert_eq!(EntryState::Absent.commitment(), None);
        assert_eq!(EntryState::Committed(c).commitment(), Some(c));
    }
}
