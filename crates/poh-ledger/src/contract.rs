//! Typed handle on a deployed registry.
//!
//! [`RegistryContract`] turns registry operations into selector/argument
//! pairs for a [`LedgerBackend`] and decodes the JSON that comes back.

use crate::abi::{Address, RegistryCall, RegistryQuery};
use crate::backend::{LedgerBackend, Receipt};
use crate::error::{LedgerError, Result};
use poh_registry::{CommitEvent, Commitment, Hash, Identity, Principal};
use serde_json::Value;
use std::sync::Arc;

/// A registry at a known address, reached through some backend.
#[derive(Clone)]
pub struct RegistryContract {
    backend: Arc<dyn LedgerBackend>,
    address: Address,
}

impl RegistryContract {
    pub fn new(backend: Arc<dyn LedgerBackend>, address: Address) -> Self {
        RegistryContract { backend, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Submits `commit(entity, date, commitment)` signed by `caller`.
    ///
    /// # Errors
    ///
    /// - `Reverted(Unauthorized)` if `caller` is not the owner
    /// - `Reverted(AlreadyCommitted)` if the identity has an entry
    /// - `Timeout` if the outcome is unknown
    pub async fn commit(
        &self,
        caller: &Principal,
        identity: &Identity,
        commitment: Commitment,
    ) -> Result<Receipt> {
        let call = RegistryCall::Commit {
            identity: identity.clone(),
            commitment,
        };
        self.backend
            .submit(&self.address, call.selector(), call.args(), caller)
            .await
    }

    /// Stored commitment for `identity`, `None` if absent.
    pub async fn get(&self, identity: &Identity) -> Result<Option<Commitment>> {
        let value = self
            .query(RegistryQuery::Get {
                identity: identity.clone(),
            })
            .await?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => s
                .parse()
                .map(Some)
                .map_err(|e: poh_registry::RegistryError| {
                    LedgerError::InvalidResponse(e.to_string())
                }),
            other => Err(unexpected("get", &other)),
        }
    }

    pub async fn owner(&self) -> Result<Option<Principal>> {
        match self.query(RegistryQuery::Owner).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Principal::new(s))),
            other => Err(unexpected("owner", &other)),
        }
    }

    pub async fn entry_count(&self) -> Result<u64> {
        let value = self.query(RegistryQuery::EntryCount).await?;
        value.as_u64().ok_or_else(|| unexpected("entryCount", &value))
    }

    /// Merkle root over all entries.
    pub async fn state_root(&self) -> Result<Hash> {
        let value = self.query(RegistryQuery::StateRoot).await?;
        let digits = value
            .as_str()
            .map(|s| s.strip_prefix("0x").unwrap_or(s))
            .ok_or_else(|| unexpected("stateRoot", &value))?;
        let bytes = hex::decode(digits).map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidResponse("stateRoot is not 32 bytes".to_string()))
    }

    /// Commit event log in sequence order.
    pub async fn events(&self) -> Result<Vec<CommitEvent>> {
        let value = self.query(RegistryQuery::Events).await?;
        serde_json::from_value(value).map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    async fn query(&self, query: RegistryQuery) -> Result<Value> {
        self.backend
            .call(&self.address, query.selector(), query.args())
            .await
    }
}

impl std::fmt::Debug for RegistryContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryContract")
            .field("address", &self.address)
            .finish()
    }
}

fn unexpected(function: &str, value: &Value) -> LedgerError {
    LedgerError::InvalidResponse(format!("{function} returned {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RevertReason;
    use crate::local::LocalLedger;
    use chrono::NaiveDate;
    use poh_registry::merkle::EMPTY_HASH;

    async fn deployed() -> (RegistryContract, Principal) {
        let ledger = Arc::new(LocalLedger::temporary().unwrap());
        let owner = Principal::new("oracle-operator");
        let d = ledger.deploy(&owner).await.unwrap();
        (RegistryContract::new(ledger, d.address), owner)
    }

    fn identity(day: u32) -> Identity {
        Identity::new("MSFT", NaiveDate::from_ymd_opt(2023, 10, day).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let (contract, owner) = deployed().await;
        let c = Commitment::from_bytes([3; 32]);

        assert_eq!(contract.get(&identity(26)).await.unwrap(), None);
        let receipt = contract.commit(&owner, &identity(26), c).await.unwrap();
        assert_eq!(receipt.events[0].commitment, c);

        assert_eq!(contract.get(&identity(26)).await.unwrap(), Some(c));
        assert_eq!(contract.entry_count().await.unwrap(), 1);
        assert_eq!(contract.owner().await.unwrap(), Some(owner));
    }

    #[tokio::test]
    async fn test_duplicate_reverts() {
        let (contract, owner) = deployed().await;
        contract
            .commit(&owner, &identity(26), Commitment::from_bytes([1; 32]))
            .await
            .unwrap();

        let err = contract
            .commit(&owner, &identity(26), Commitment::from_bytes([2; 32]))
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some(&RevertReason::AlreadyCommitted));
        assert_eq!(
            contract.get(&identity(26)).await.unwrap(),
            Some(Commitment::from_bytes([1; 32]))
        );
    }

    #[tokio::test]
    async fn test_state_root_and_events() {
        let (contract, owner) = deployed().await;
        assert_eq!(contract.state_root().await.unwrap(), EMPTY_HASH);

        for day in [24, 25, 26] {
            contract
                .commit(&owner, &identity(day), Commitment::from_bytes([day as u8; 32]))
                .await
                .unwrap();
        }

        assert_ne!(contract.state_root().await.unwrap(), EMPTY_HASH);
        let events = contract.events().await.unwrap();
        let days: Vec<_> = events.iter().map(|e| e.identity.clone()).collect();
        assert_eq!(days, vec![identity(24), identity(25), identity(26)]);
    }
}
