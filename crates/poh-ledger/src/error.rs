//! Error types for ledger operations.
//!
//! A transaction either lands, reverts with a [`RevertReason`] raised by the
//! registry state machine, or fails at the ledger level. `Timeout` is the one
//! ambiguous case: the transaction may or may not have landed.

use crate::abi::{Address, Selector};
use poh_registry::{Principal, RegistryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Why the registry rejected a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RevertReason {
    /// Caller is not the registry owner.
    #[error("caller {caller} is not the owner {owner}")]
    Unauthorized {
        /// Principal that signed the transaction.
        caller: Principal,
        /// Registry owner.
        owner: Principal,
    },

    /// The identity already has an entry.
    #[error("data for this identity already committed")]
    AlreadyCommitted,

    /// The registry already has an owner.
    #[error("registry already initialized")]
    AlreadyInitialized,

    /// The registry has no owner.
    #[error("registry not initialized")]
    NotInitialized,

    /// Arguments decoded but were rejected by the registry.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors surfaced by a ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction executed and was rejected by the registry.
    #[error("transaction reverted: {0}")]
    Reverted(RevertReason),

    /// No registry is deployed at the address.
    #[error("no contract deployed at {0}")]
    UnknownContract(Address),

    /// The selector names no function (or the wrong kind of function).
    #[error("unknown function selector {0}")]
    UnknownSelector(Selector),

    /// Arguments do not match the function signature.
    #[error("invalid call arguments: {0}")]
    InvalidArguments(String),

    /// A return value could not be decoded.
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),

    /// The round trip did not complete in time. Outcome unknown.
    #[error("ledger round trip timed out after {0:?}")]
    Timeout(Duration),

    /// The ledger cannot be reached or cannot serve requests.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Deployment descriptor missing, malformed, or incompatible.
    #[error("deployment descriptor error: {0}")]
    Descriptor(String),

    /// Underlying storage failure.
    #[error("ledger storage error: {0}")]
    Storage(#[from] sled::Error),

    /// File system failure (descriptor I/O).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure (descriptor or argument encoding).
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// True if the transaction may or may not have landed.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, LedgerError::Timeout(_))
    }

    /// The revert reason, if the registry rejected the transaction.
    pub fn revert_reason(&self) -> Option<&RevertReason> {
        match self {
            LedgerError::Reverted(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<RegistryError> for LedgerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unauthorized { caller, owner } => {
                LedgerError::Reverted(RevertReason::Unauthorized { caller, owner })
            }
            RegistryError::AlreadyCommitted(_) => {
                LedgerError::Reverted(RevertReason::AlreadyCommitted)
            }
            RegistryError::AlreadyInitialized { .. } => {
                LedgerError::Reverted(RevertReason::AlreadyInitialized)
            }
            RegistryError::NotInitialized => LedgerError::Reverted(RevertReason::NotInitialized),
            RegistryError::InvalidIdentity(msg) | RegistryError::InvalidCommitment(msg) => {
                LedgerError::Reverted(RevertReason::InvalidInput(msg))
            }
            RegistryError::Database(e) => LedgerError::Storage(e),
            RegistryError::Serialization(e) => LedgerError::Serialization(e),
            RegistryError::CorruptEntry(msg) => LedgerError::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use poh_registry::Identity;

    #[test]
    fn test_registry_errors_map_to_reverts() {
        let id = Identity::new("AAPL", NaiveDate::from_ymd_opt(2023, 10, 25).unwrap()).unwrap();
        let err: LedgerError = RegistryError::AlreadyCommitted(id).into();
        assert_eq!(err.revert_reason(), Some(&RevertReason::AlreadyCommitted));

        let err: LedgerError = RegistryError::Unauthorized {
            caller: Principal::new("a"),
            owner: Principal::new("b"),
        }
        .into();
        assert!(matches!(
            err.revert_reason(),
            Some(RevertReason::Unauthorized { .. })
        ));

        let err: LedgerError = RegistryError::CorruptEntry("x".into()).into();
        assert!(err.revert_reason().is_none());
    }

    #[test]
    fn test_only_timeout_is_indeterminate() {
        assert!(LedgerError::Timeout(Duration::from_secs(1)).is_indeterminate());
        assert!(!LedgerError::Unavailable("down".into()).is_indeterminate());
        assert!(!LedgerError::Reverted(RevertReason::AlreadyCommitted).is_indeterminate());
    }
}
