//! The unified oracle facade.
//!
//! [`Oracle`] ties a configuration, a deployment descriptor and a ledger
//! backend together and exposes the operator-level actions: commit a
//! dataset, verify it, look up one record, and inspect the registry.

use crate::{
    commit::Committer,
    config::OracleConfig,
    dataset::Dataset,
    pipeline::with_deadline,
    report::{CommitReport, RegistryStatus, VerifyReport},
    verify::Verifier,
    Result,
};

use poh_ledger::{DeploymentDescriptor, LedgerBackend, RegistryContract};
use poh_registry::{CommitEvent, Commitment, Identity};
use std::sync::Arc;
use tracing::info;

/// Oracle client bound to one deployed registry.
///
/// # Example
///
/// ```rust,ignore
/// let ledger = Arc::new(LocalLedger::open(&config.ledger.db_path)?);
/// let oracle = Oracle::connect(config, ledger)?;
///
/// let dataset = oracle.load_dataset()?;
/// let report = oracle.commit(&dataset).await;
/// println!("{report}");
/// ```
#[derive(Debug)]
pub struct Oracle {
    config: OracleConfig,
    descriptor: DeploymentDescriptor,
    contract: RegistryContract,
}

impl Oracle {
    /// Connects using the descriptor at `config.ledger.deployment_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the configuration is invalid
    /// - the descriptor is missing, malformed or incompatible
    pub fn connect(config: OracleConfig, backend: Arc<dyn LedgerBackend>) -> Result<Self> {
        config.validate()?;
        let descriptor = DeploymentDescriptor::load(&config.ledger.deployment_path)?;
        Self::with_descriptor(config, backend, descriptor)
    }

    /// Connects using an already loaded descriptor.
    pub fn with_descriptor(
        config: OracleConfig,
        backend: Arc<dyn LedgerBackend>,
        descriptor: DeploymentDescriptor,
    ) -> Result<Self> {
        config.validate()?;
        descriptor.check_compatible()?;
        let contract = RegistryContract::new(backend, descriptor.address.clone());
        info!(
            address = %descriptor.address,
            caller = %config.client.caller,
            "oracle connected"
        );
        Ok(Self {
            config,
            descriptor,
            contract,
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &DeploymentDescriptor {
        &self.descriptor
    }

    /// Loads the configured dataset.
    pub fn load_dataset(&self) -> Result<Dataset> {
        Ok(Dataset::load(&self.config.dataset.path)?)
    }

    /// Commits every row of `dataset`.
    pub async fn commit(&self, dataset: &Dataset) -> CommitReport {
        Committer::new(self.contract.clone(), self.config.client.clone())
            .run(dataset)
            .await
    }

    /// Verifies every row of `dataset` against the registry.
    pub async fn verify(&self, dataset: &Dataset) -> VerifyReport {
        Verifier::new(self.contract.clone(), self.config.client.clone())
            .run(dataset)
            .await
    }

    /// Stored commitment for one identity.
    pub async fn lookup(&self, identity: &Identity) -> Result<Option<Commitment>> {
        Ok(with_deadline(self.config.client.read_timeout(), self.contract.get(identity)).await?)
    }

    /// Owner, size and state root of the registry.
    pub async fn status(&self) -> Result<RegistryStatus> {
        let deadline = self.config.client.read_timeout();
        let owner = with_deadline(deadline, self.contract.owner()).await?;
        let entries = with_deadline(deadline, self.contract.entry_count()).await?;
        let root = with_deadline(deadline, self.contract.state_root()).await?;
        Ok(RegistryStatus {
            address: self.descriptor.address.clone(),
            owner,
            entries,
            state_root: format!("0x{}", hex::encode(root)),
            deployed_block: self.descriptor.block,
            deployed_at: self.descriptor.deployed_at,
        })
    }

    /// The registry's commit event log, oldest first.
    pub async fn history(&self) -> Result<Vec<CommitEvent>> {
        Ok(with_deadline(self.config.client.read_timeout(), self.contract.events()).await?)
    }
}
