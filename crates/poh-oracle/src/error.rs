//! Error types for the oracle client.
//!
//! Row-level problems never surface here: they become outcomes in a report.
//! `OracleError` covers what stops the client before or outside a run.

use crate::dataset::DatasetError;
use thiserror::Error;

/// Core error type for oracle operations.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dataset cannot be loaded at all.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Ledger error passthrough.
    #[error("Ledger error: {0}")]
    Ledger(#[from] poh_ledger::LedgerError),
}
