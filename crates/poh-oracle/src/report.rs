//! Report types for commit and verification runs.
//!
//! A report always holds one row per dataset row, in dataset order. A
//! run-level failure (lost authority, unreachable ledger) is carried beside
//! the rows, never instead of them.

use crate::dataset::{DatasetRow, SchemaError};
use chrono::{DateTime, Utc};
use poh_ledger::Address;
use poh_registry::{Commitment, Identity, Principal};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a whole run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum RunFailure {
    /// The configured caller is not the registry owner.
    #[error("caller {caller} is not the registry owner ({})", owner_label(.owner))]
    Unauthorized {
        caller: Principal,
        owner: Option<Principal>,
    },

    /// The ledger could not serve the run.
    #[error("ledger backend failed: {0}")]
    Backend(String),
}

fn owner_label(owner: &Option<Principal>) -> String {
    owner.as_ref().map_or("none".to_string(), |o| o.to_string())
}

// =============================================================================
// Commit Reports
// =============================================================================

/// Result of committing one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The commitment is on the ledger because of this run. `tx_hash` is
    /// `None` when the write was only confirmed by reading it back.
    Committed {
        commitment: Commitment,
        tx_hash: Option<String>,
        block: Option<u64>,
    },

    /// The identity already had an entry; nothing was written.
    AlreadySkipped { commitment: Commitment },

    Failed(CommitFailure),
}

impl CommitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CommitOutcome::Committed { .. } => "committed",
            CommitOutcome::AlreadySkipped { .. } => "already-skipped",
            CommitOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CommitOutcome::AlreadySkipped { .. })
    }
}

/// Why a row was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitFailure {
    /// The row did not parse.
    Schema(SchemaError),
    /// Every attempt ended without a known outcome.
    Indeterminate { attempts: u32 },
    /// The registry refused the call for a row-specific reason.
    Rejected(String),
    /// The caller lost (or never had) write authority.
    Unauthorized,
    /// The ledger failed while handling this row.
    Backend(String),
    /// Not attempted because the run was aborted.
    Aborted,
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitFailure::Schema(e) => write!(f, "schema: {}", e),
            CommitFailure::Indeterminate { attempts } => {
                write!(f, "indeterminate after {} attempts", attempts)
            }
            CommitFailure::Rejected(reason) => write!(f, "rejected: {}", reason),
            CommitFailure::Unauthorized => f.write_str("unauthorized"),
            CommitFailure::Backend(e) => write!(f, "backend: {}", e),
            CommitFailure::Aborted => f.write_str("aborted"),
        }
    }
}

/// One row of a commit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRow {
    pub line: usize,
    pub identity: Option<Identity>,
    pub outcome: CommitOutcome,
}

impl CommitRow {
    pub(crate) fn new(row: &DatasetRow, outcome: CommitOutcome) -> Self {
        CommitRow {
            line: row.line,
            identity: row.identity().cloned(),
            outcome,
        }
    }
}

/// Counts per commit outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub committed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Everything a commit run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub rows: Vec<CommitRow>,
    pub summary: CommitSummary,
    pub failure: Option<RunFailure>,
}

impl CommitReport {
    pub(crate) fn new(rows: Vec<CommitRow>, failure: Option<RunFailure>) -> Self {
        let mut summary = CommitSummary::default();
        for row in &rows {
            match row.outcome {
                CommitOutcome::Committed { .. } => summary.committed += 1,
                CommitOutcome::AlreadySkipped { .. } => summary.skipped += 1,
                CommitOutcome::Failed(_) => summary.failed += 1,
            }
        }
        CommitReport {
            rows,
            summary,
            failure,
        }
    }

    /// Outcome for an identity, if some row carries it.
    pub fn outcome(&self, identity: &Identity) -> Option<&CommitOutcome> {
        self.rows
            .iter()
            .find(|r| r.identity.as_ref() == Some(identity))
            .map(|r| &r.outcome)
    }

    /// True unless the run as a whole failed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f)?;
        for row in &self.rows {
            let detail = match &row.outcome {
                CommitOutcome::Committed {
                    commitment,
                    tx_hash: Some(tx),
                    block,
                } => format!(
                    "{} tx {} block {}",
                    commitment,
                    tx,
                    block.map_or("?".to_string(), |b| b.to_string())
                ),
                CommitOutcome::Committed { commitment, .. } => {
                    format!("{} (confirmed by read-back)", commitment)
                }
                CommitOutcome::AlreadySkipped { commitment } => commitment.to_string(),
                CommitOutcome::Failed(reason) => reason.to_string(),
            };
            write_row(f, row.line, row.identity.as_ref(), row.outcome.label(), &detail)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "committed: {}  already-skipped: {}  failed: {}",
            self.summary.committed, self.summary.skipped, self.summary.failed
        )?;
        write_failure(f, self.failure.as_ref())
    }
}

// =============================================================================
// Verification Reports
// =============================================================================

/// Result of verifying one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// Stored commitment equals the recomputed one.
    Match { commitment: Commitment },

    /// The local row differs from what was committed.
    Mismatch {
        stored: Commitment,
        recomputed: Commitment,
    },

    /// The registry has no entry for the identity.
    NeverCommitted { recomputed: Commitment },

    Failed(VerifyFailure),
}

impl VerifyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            VerifyOutcome::Match { .. } => "match",
            VerifyOutcome::Mismatch { .. } => "MISMATCH",
            VerifyOutcome::NeverCommitted { .. } => "never-committed",
            VerifyOutcome::Failed(_) => "failed",
        }
    }
}

/// Why a row could not be verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyFailure {
    Schema(SchemaError),
    /// Every read timed out.
    Indeterminate { attempts: u32 },
    Backend(String),
    Aborted,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyFailure::Schema(e) => write!(f, "schema: {}", e),
            VerifyFailure::Indeterminate { attempts } => {
                write!(f, "no answer after {} attempts", attempts)
            }
            VerifyFailure::Backend(e) => write!(f, "backend: {}", e),
            VerifyFailure::Aborted => f.write_str("aborted"),
        }
    }
}

/// One row of a verification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRow {
    pub line: usize,
    pub identity: Option<Identity>,
    pub outcome: VerifyOutcome,
}

impl VerifyRow {
    pub(crate) fn new(row: &DatasetRow, outcome: VerifyOutcome) -> Self {
        VerifyRow {
            line: row.line,
            identity: row.identity().cloned(),
            outcome,
        }
    }
}

/// Counts per verification outcome plus the identities that mismatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySummary {
    pub matched: usize,
    pub mismatched: usize,
    pub never_committed: usize,
    pub failed: usize,
    pub mismatches: Vec<Identity>,
}

/// Everything a verification run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub rows: Vec<VerifyRow>,
    pub summary: VerifySummary,
    pub failure: Option<RunFailure>,
}

impl VerifyReport {
    pub(crate) fn new(rows: Vec<VerifyRow>, failure: Option<RunFailure>) -> Self {
        let mut summary = VerifySummary::default();
        for row in &rows {
            match row.outcome {
                VerifyOutcome::Match { .. } => summary.matched += 1,
                VerifyOutcome::Mismatch { .. } => {
                    summary.mismatched += 1;
                    summary.mismatches.extend(row.identity.clone());
                }
                VerifyOutcome::NeverCommitted { .. } => summary.never_committed += 1,
                VerifyOutcome::Failed(_) => summary.failed += 1,
            }
        }
        VerifyReport {
            rows,
            summary,
            failure,
        }
    }

    pub fn outcome(&self, identity: &Identity) -> Option<&VerifyOutcome> {
        self.rows
            .iter()
            .find(|r| r.identity.as_ref() == Some(identity))
            .map(|r| &r.outcome)
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f)?;
        for row in &self.rows {
            let detail = match &row.outcome {
                VerifyOutcome::Match { commitment } => commitment.to_string(),
                VerifyOutcome::Mismatch { stored, recomputed } => {
                    format!("stored {} recomputed {}", stored, recomputed)
                }
                VerifyOutcome::NeverCommitted { recomputed } => recomputed.to_string(),
                VerifyOutcome::Failed(reason) => reason.to_string(),
            };
            write_row(f, row.line, row.identity.as_ref(), row.outcome.label(), &detail)?;
        }
        writeln!(f)?;
        let s = &self.summary;
        writeln!(
            f,
            "match: {}  mismatch: {}  never-committed: {}  failed: {}",
            s.matched, s.mismatched, s.never_committed, s.failed
        )?;
        if !s.mismatches.is_empty() {
            writeln!(f, "MISMATCHED RECORDS:")?;
            for identity in &s.mismatches {
                writeln!(f, "  {}", identity)?;
            }
        }
        write_failure(f, self.failure.as_ref())
    }
}

// =============================================================================
// Registry Status
// =============================================================================

/// Snapshot of a deployed registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub address: Address,
    pub owner: Option<Principal>,
    pub entries: u64,
    /// `0x`-prefixed Merkle root over all entries.
    pub state_root: String,
    pub deployed_block: u64,
    pub deployed_at: DateTime<Utc>,
}

impl fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "address:     {}", self.address)?;
        match &self.owner {
            Some(owner) => writeln!(f, "owner:       {}", owner)?,
            None => writeln!(f, "owner:       (not initialized)")?,
        }
        writeln!(f, "entries:     {}", self.entries)?;
        writeln!(f, "state root:  {}", self.state_root)?;
        write!(
            f,
            "deployed:    block {} at {}",
            self.deployed_block,
            self.deployed_at.to_rfc3339()
        )
    }
}

// =============================================================================
// Table Rendering
// =============================================================================

fn write_header(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{:>5}  {:<24} {:<16} DETAIL", "LINE", "IDENTITY", "OUTCOME")
}

fn write_row(
    f: &mut fmt::Formatter<'_>,
    line: usize,
    identity: Option<&Identity>,
    label: &str,
    detail: &str,
) -> fmt::Result {
    let identity = identity.map_or("-".to_string(), |i| i.to_string());
    writeln!(f, "{:>5}  {:<24} {:<16} {}", line, identity, label, detail)
}

fn write_failure(f: &mut fmt::Formatter<'_>, failure: Option<&RunFailure>) -> fmt::Result {
    match failure {
        Some(failure) => writeln!(f, "RUN FAILED: {}", failure),
        None => Ok(()),
    }
}
