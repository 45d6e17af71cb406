//! The ledger backend seam.
//!
//! Everything the oracle knows about a ledger goes through [`LedgerBackend`]:
//! submit a signed transaction, or run a read-only call. Both are async and
//! may fail with [`LedgerError`]. A backend that gives up waiting must report
//! `LedgerError::Timeout` so callers can treat the outcome as unknown.

use crate::abi::{Address, Selector};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poh_registry::{CommitEvent, Principal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Proof that a transaction landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// `0x`-prefixed transaction hash.
    pub tx_hash: String,
    /// Block the transaction was included in.
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub contract: Address,
    pub selector: Selector,
    /// Events emitted by the transaction.
    pub events: Vec<CommitEvent>,
}

/// A ledger that hosts registry contracts.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Submits a state-changing transaction signed by `caller` and waits for
    /// it to be finalized.
    async fn submit(
        &self,
        contract: &Address,
        selector: Selector,
        args: Value,
        caller: &Principal,
    ) -> Result<Receipt>;

    /// Runs a read-only call against finalized state.
    async fn call(&self, contract: &Address, selector: Selector, args: Value) -> Result<Value>;
}
