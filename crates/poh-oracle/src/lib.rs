//! # Proof-of-History Oracle Client
//!
//! Commits fingerprints of historical records to a write-once registry and
//! later proves whether local records still match what was committed.
//!
//! ## Threat Coverage
//!
//! | Threat | Path | Outcome |
//! |--------|------|---------|
//! | Retroactive edit of a record | Verify | `Mismatch { stored, recomputed }` |
//! | Fabricated record that never existed | Verify | `NeverCommitted` |
//! | Re-submission of history | Commit | `AlreadySkipped`, registry unchanged |
//! | Writer without authority | Commit | run aborted as `Unauthorized` |
//! | Lost round trip | Commit | read-back decides, then retry |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ORACLE CLIENT                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   CSV ──▶ ┌──────────┐       ┌─────────────────┐                │
//! │           │ Dataset  │──────▶│     Oracle      │ ← facade       │
//! │           └──────────┘       └────────┬────────┘                │
//! │                         ┌─────────────┴────────────┐            │
//! │                         ▼                          ▼            │
//! │                 ┌──────────────┐          ┌──────────────┐      │
//! │                 │  Committer   │          │   Verifier   │      │
//! │                 └──────┬───────┘          └──────┬───────┘      │
//! │                        └────────────┬────────────┘              │
//! │                                     ▼                           │
//! │                        RegistryContract ─▶ dyn LedgerBackend    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use poh_oracle::{Oracle, OracleConfig};
//!
//! let oracle = Oracle::connect(OracleConfig::default(), ledger)?;
//! let dataset = oracle.load_dataset()?;
//!
//! let report = oracle.verify(&dataset).await;
//! for identity in &report.summary.mismatches {
//!     eprintln!("tampered: {identity}");
//! }
//! ```
//!
//! ## Notes
//!
//! - Commit and verify share one canonical encoder, so a row that was
//!   committed unchanged always verifies as `Match`.
//! - Row problems are outcomes, not errors. `OracleError` is reserved for
//!   failures before a run starts.
//! - Reports are in dataset order regardless of completion order.

mod commit;
mod config;
mod dataset;
mod error;
mod oracle;
mod pipeline;
mod report;
mod verify;

pub use commit::Committer;
pub use config::{ClientConfig, DatasetConfig, LedgerConfig, OracleConfig};
pub use dataset::{Dataset, DatasetError, DatasetRow, SchemaError, REQUIRED_COLUMNS};
pub use error::OracleError;
pub use oracle::Oracle;
pub use report::{
    CommitFailure, CommitOutcome, CommitReport, CommitRow, CommitSummary, RegistryStatus,
    RunFailure, VerifyFailure, VerifyOutcome, VerifyReport, VerifyRow, VerifySummary,
};
pub use verify::Verifier;

// Re-export component types for convenience
pub use poh_ledger::{DeploymentDescriptor, LedgerBackend, LedgerError, LocalLedger};
pub use poh_registry::{Commitment, Identity, Principal, Record, RecordPayload};

/// Core result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
