//! # Proof-of-History Registry - Write-Once Commitments
//!
//! The registry is the on-ledger half of the proof-of-history oracle. It keeps
//! a durable mapping from record identity `(entity_id, as_of_date)` to a
//! SHA-256 commitment of that record, written by a single owner and never
//! overwritten.
//!
//! ## Purpose
//!
//! This crate implements four capabilities:
//!
//! 1. **Canonical Encoding** - A fixed, versioned byte layout for record
//!    payloads so that every client derives bit-identical commitments.
//!
//! 2. **Write-Once Registry** - An owner-gated state machine in which each
//!    identity moves from `Absent` to `Committed` exactly once.
//!
//! 3. **Commit Event Log** - An append-only audit trail of every accepted
//!    commit, with caller and timestamp.
//!
//! 4. **State Root** - A Merkle root over all entries with inclusion proofs.
//!
//! ## Threat Model
//!
//! | Threat | Description | Defense |
//! |--------|-------------|---------|
//! | History rewrite | Replace a committed hash | Insert-if-absent, no update path |
//! | Rogue writer | Non-owner submits hashes | Owner check on every commit |
//! | Format drift | Two clients encode a row differently | Single canonical encoder |
//! | Numeric quirks | `171.8` vs `171.80` | Fixed-point decimal parsing |
//! | Double submit race | Two writers, one identity | Transactional insert |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          REGISTRY                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌────────────────┐   commitment   ┌──────────────────────┐     │
//! │  │ CANONICALIZER  │──────────────▶ │   REGISTRY (FSM)     │     │
//! │  │ record → bytes │                │  owner / write-once  │     │
//! │  │ SHA-256        │                └──────────┬───────────┘     │
//! │  └────────────────┘                           │                 │
//! │                              ┌────────────────┴─────────┐       │
//! │                              ▼                          ▼       │
//! │                   ┌─────────────────────┐   ┌──────────────┐    │
//! │                   │   SLED STORAGE      │   │ MERKLE TREE  │    │
//! │                   │ meta/entries/events │──▶│ state root   │    │
//! │                   └─────────────────────┘   └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use poh_registry::{Identity, Principal, Record, RecordPayload, Registry};
//! use chrono::NaiveDate;
//!
//! let registry = Registry::temporary().unwrap();
//! let owner = Principal::new("oracle");
//! registry.initialize(&owner).unwrap();
//!
//! let record = Record {
//!     identity: Identity::new("AAPL", NaiveDate::from_ymd_opt(2023, 10, 25).unwrap()).unwrap(),
//!     payload: RecordPayload {
//!         open: "170.65".parse().unwrap(),
//!         high: "173.06".parse().unwrap(),
//!         low: "170.65".parse().unwrap(),
//!         close: "171.80".parse().unwrap(),
//!         volume: 57157115,
//!     },
//! };
//!
//! registry.commit(&owner, &record.identity, record.commitment()).unwrap();
//! assert_eq!(registry.get(&record.identity).unwrap(), Some(record.commitment()));
//! ```
//!
//! ## Security Considerations
//!
//! - **Hash Algorithm**: SHA-256, 128-bit collision resistance.
//! - **Storage Security**: The sled database is not encrypted at rest; the
//!   ledger process should own it exclusively.
//! - **Point-in-time Reads**: `get` reflects finalized state at the time of
//!   the call; entries never change afterwards.

pub mod canonicalize;
pub mod merkle;
pub mod models;
pub mod record;
pub mod registry;
pub mod storage;

pub use models::{
    CommitEvent, Commitment, EntryState, Hash, Identity, MerkleProof, Principal, RegistryError,
    Result, YEAR_RANGE,
};
pub use record::{Price, Record, RecordPayload, ValueError};
pub use registry::Registry;
