//! # Canonical Record Encoding
//!
//! Deterministic serialization of a [`Record`] into bytes, and the commitment
//! hash computed over those bytes. The commit path and the verification path
//! both call [`commitment_for`]; there is no second encoder.
//!
//! ## Threat Model
//!
//! Canonicalization defends against:
//!
//! - **Number Representation**: `171.8` and `171.80` are the same price. Prices
//!   are fixed-point integers before they are encoded, so formatting quirks in
//!   the source file cannot change a hash.
//! - **Field Ambiguity**: Every field has a fixed position and width. The only
//!   variable-length field (the entity token) is length-prefixed, so no two
//!   distinct records share an encoding.
//! - **Cross-Protocol Reuse**: A domain tag leads the encoding, so a record
//!   hash cannot be confused with a Merkle leaf or node hash.
//!
//! ## Layout (version 1)
//!
//! | Part | Encoding |
//! |------|----------|
//! | domain tag | ASCII `POH-RECORD-V1` (13 bytes) |
//! | entity id length | u8 |
//! | entity id | ASCII bytes |
//! | as-of date | u32 big-endian, `yyyymmdd` |
//! | open, high, low, close | i64 big-endian each, units of `10^-8` |
//! | volume | u64 big-endian |
//!
//! Any two implementations must agree on this layout bit-for-bit to
//! interoperate against the same registry. Changing it means a new tag.
//!
//! ## Example
//!
//! ```rust
//! use poh_registry::canonicalize::{canonicalize, commitment_for};
//! use poh_registry::{Identity, Price, Record, RecordPayload};
//! use chrono::NaiveDate;
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
//! let bytes = canonicalize(&record);
//! assert!(bytes.starts_with(b"POH-RECORD-V1"));
//! assert_eq!(commitment_for(&record), commitment_for(&record.clone()));
//! ```

use crate::models::{Commitment, Hash};
use crate::record::Record;
use sha2::{Digest, Sha256};

/// Domain tag leading every canonical record encoding.
pub const RECORD_DOMAIN_TAG: &[u8] = b"POH-RECORD-V1";

/// Encodes a record into its canonical byte sequence.
///
/// # Arguments
///
/// * `record` - The record to encode
///
/// # Returns
///
/// The canonical bytes. Equal records always produce equal bytes.
pub fn canonicalize(record: &Record) -> Vec<u8> {
    let entity = record.identity.entity_id().as_bytes();
    let payload = &record.payload;

    let mut out = Vec::with_capacity(RECORD_DOMAIN_TAG.len() + 1 + entity.len() + 4 + 8 * 5);
    out.extend_from_slice(RECORD_DOMAIN_TAG);
    // Identity validation caps entity ids at 32 bytes.
    out.push(entity.len() as u8);
    out.extend_from_slice(entity);
    out.extend_from_slice(&record.identity.date_code().to_be_bytes());
    for price in [payload.open, payload.high, payload.low, payload.close] {
        out.extend_from_slice(&price.units().to_be_bytes());
    }
    out.extend_from_slice(&payload.volume.to_be_bytes());
    out
}

/// Computes the commitment of a record: SHA-256 over its canonical bytes.
pub fn commitment_for(record: &Record) -> Commitment {
    Commitment::from_bytes(sha256(&canonicalize(record)))
}

/// SHA-256 of an arbitrary byte string.
pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
