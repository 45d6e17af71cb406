//! # Local Ledger
//!
//! An embedded, single-node ledger that hosts registry contracts in one sled
//! database. It provides the properties the oracle relies on from a real
//! ledger:
//!
//! - **Finality on return**: `submit` returns only after the state change is
//!   applied, so a following `call` observes it.
//! - **Total order**: transactions are sequenced one at a time and each
//!   successful one advances the block height by one.
//! - **Persistence**: contracts, entries and height survive a restart.
//!
//! ## Layout
//!
//! ```text
//! ledger/contracts   address -> deployer
//! ledger/chain       "height" -> u64 (big-endian)
//! 0x<address>/meta   registry owner
//! 0x<address>/entries, 0x<address>/events
//! ```

use crate::abi::{Address, RegistryCall, RegistryQuery, Selector, ADDRESS_LEN};
use crate::backend::{LedgerBackend, Receipt};
use crate::deployment::DeploymentDescriptor;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use poh_registry::canonicalize::sha256;
use poh_registry::storage::Storage;
use poh_registry::{Principal, Registry};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const CONTRACTS_TREE: &str = "ledger/contracts";
const CHAIN_TREE: &str = "ledger/chain";
const HEIGHT_KEY: &[u8] = b"height";
const ADDRESS_DOMAIN_TAG: &[u8] = b"POH-ADDRESS-V1";
const TX_DOMAIN_TAG: &[u8] = b"POH-TX-V1";

/// Embedded ledger backed by sled.
pub struct LocalLedger {
    db: sled::Db,
    contracts: sled::Tree,
    chain: sled::Tree,
    /// Registries opened so far, by address.
    registries: RwLock<HashMap<Address, Registry>>,
    /// Serializes state-changing transactions.
    sequencer: Mutex<()>,
}

impl LocalLedger {
    /// Opens (or creates) a ledger at `path`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the database cannot be opened, for
    /// example because another process holds it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// In-memory ledger for tests.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self> {
        let contracts = db.open_tree(CONTRACTS_TREE)?;
        let chain = db.open_tree(CHAIN_TREE)?;
        Ok(LocalLedger {
            db,
            contracts,
            chain,
            registries: RwLock::new(HashMap::new()),
            sequencer: Mutex::new(()),
        })
    }

    /// Deploys a fresh registry owned by `deployer`.
    ///
    /// The address is derived from the deployer and a ledger-wide nonce, so
    /// repeated deployments by one principal get distinct addresses.
    pub async fn deploy(&self, deployer: &Principal) -> Result<DeploymentDescriptor> {
        let _turn = self.sequencer.lock().await;

        let nonce = self.db.generate_id()?;
        let address = derive_address(deployer, nonce);
        let registry = Registry::with_storage(Storage::in_db(&self.db, &address.to_hex())?);
        registry.initialize(deployer)?;
        self.contracts
            .insert(address.as_bytes(), deployer.as_str().as_bytes())?;
        let block = self.advance()?;

        self.registries
            .write()
            .await
            .insert(address.clone(), registry);

        info!(%address, owner = %deployer, block, "registry deployed");
        Ok(DeploymentDescriptor::new(
            address,
            deployer.clone(),
            block,
            Utc::now(),
        ))
    }

    /// The registry at `address`, opened on first use.
    pub async fn registry(&self, address: &Address) -> Result<Registry> {
        if let Some(registry) = self.registries.read().await.get(address) {
            return Ok(registry.clone());
        }

        if !self.contracts.contains_key(address.as_bytes())? {
            return Err(LedgerError::UnknownContract(address.clone()));
        }

        let mut registries = self.registries.write().await;
        if let Some(registry) = registries.get(address) {
            return Ok(registry.clone());
        }
        let registry = Registry::with_storage(Storage::in_db(&self.db, &address.to_hex())?);
        debug!(%address, entries = registry.len(), "opened registry");
        registries.insert(address.clone(), registry.clone());
        Ok(registry)
    }

    /// Addresses of every deployed registry.
    pub fn contracts(&self) -> Result<Vec<Address>> {
        let mut out = Vec::new();
        for item in self.contracts.iter() {
            let (key, _) = item?;
            let bytes: [u8; ADDRESS_LEN] = key.as_ref().try_into().map_err(|_| {
                LedgerError::Unavailable(format!("corrupt contract key of {} bytes", key.len()))
            })?;
            out.push(Address::from_bytes(bytes));
        }
        Ok(out)
    }

    /// Number of blocks produced so far.
    pub fn block_height(&self) -> Result<u64> {
        match self.chain.get(HEIGHT_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                    LedgerError::Unavailable("corrupt block height".to_string())
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Flushes all pending writes to disk.
    pub async fn flush(&self) -> Result<usize> {
        Ok(self.db.flush_async().await?)
    }

    /// Produces the next block. Callers must hold the sequencer.
    fn advance(&self) -> Result<u64> {
        let next = self.block_height()? + 1;
        self.chain.insert(HEIGHT_KEY, next.to_be_bytes().to_vec())?;
        Ok(next)
    }
}

#[async_trait]
impl LedgerBackend for LocalLedger {
    async fn submit(
        &self,
        contract: &Address,
        selector: Selector,
        args: Value,
        caller: &Principal,
    ) -> Result<Receipt> {
        let call = RegistryCall::decode(selector, &args)?;
        let registry = self.registry(contract).await?;

        let _turn = self.sequencer.lock().await;
        let timestamp = Utc::now();
        let applied = match &call {
            RegistryCall::Initialize { owner } => registry.initialize(owner).map(|_| Vec::new()),
            RegistryCall::Commit {
                identity,
                commitment,
            } => registry
                .commit_at(caller, identity, *commitment, timestamp)
                .map(|event| vec![event]),
        };
        let events = applied.map_err(|e| {
            let e = LedgerError::from(e);
            if e.revert_reason().is_some() {
                debug!(%contract, %selector, %caller, error = %e, "transaction reverted");
            } else {
                warn!(%contract, %selector, error = %e, "transaction failed");
            }
            e
        })?;

        let block = self.advance()?;
        let tx_hash = transaction_hash(contract, selector, &args, caller, block);
        debug!(%contract, %selector, block, %tx_hash, "transaction finalized");

        Ok(Receipt {
            tx_hash,
            block,
            timestamp,
            contract: contract.clone(),
            selector,
            events,
        })
    }

    async fn call(&self, contract: &Address, selector: Selector, args: Value) -> Result<Value> {
        let query = RegistryQuery::decode(selector, &args)?;
        let registry = self.registry(contract).await?;

        let value = match query {
            RegistryQuery::Get { identity } => match registry.get(&identity)? {
                Some(commitment) => Value::String(commitment.to_hex()),
                None => Value::Null,
            },
            RegistryQuery::Owner => match registry.owner()? {
                Some(owner) => Value::String(owner.as_str().to_string()),
                None => Value::Null,
            },
            RegistryQuery::EntryCount => Value::from(registry.len() as u64),
            RegistryQuery::StateRoot => {
                Value::String(format!("0x{}", hex::encode(registry.state_root()?)))
            }
            RegistryQuery::Events => serde_json::to_value(registry.events()?)?,
        };
        Ok(value)
    }
}

impl std::fmt::Debug for LocalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLedger")
            .field("contracts", &self.contracts.len())
            .field("height", &self.block_height().ok())
            .finish()
    }
}

fn derive_address(deployer: &Principal, nonce: u64) -> Address {
    let mut preimage = Vec::with_capacity(ADDRESS_DOMAIN_TAG.len() + deployer.as_str().len() + 8);
    preimage.extend_from_slice(ADDRESS_DOMAIN_TAG);
    preimage.extend_from_slice(deployer.as_str().as_bytes());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    let digest = sha256(&preimage);

    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&digest[digest.len() - ADDRESS_LEN..]);
    Address::from_bytes(bytes)
}

fn transaction_hash(
    contract: &Address,
    selector: Selector,
    args: &Value,
    caller: &Principal,
    block: u64,
) -> String {
    let mut preimage = Vec::new();
    preimage.extend_from_slice(TX_DOMAIN_TAG);
    preimage.extend_from_slice(contract.as_bytes());
    preimage.extend_from_slice(selector.as_bytes());
    preimage.extend_from_slice(args.to_string().as_bytes());
    preimage.extend_from_slice(caller.as_str().as_bytes());
    preimage.extend_from_slice(&block.to_be_bytes());
    format!("0x{}", hex::encode(sha256(&preimage)))
}
