//! Configuration types for the oracle client.

use crate::error::OracleError;
use crate::Result;
use poh_registry::Principal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the oracle client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Where the ledger and the deployment descriptor live.
    pub ledger: LedgerConfig,

    /// Commit and verification behavior.
    pub client: ClientConfig,

    /// Input dataset.
    pub dataset: DatasetConfig,
}

impl OracleConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read, is not valid JSON, or fails
    /// [`OracleConfig::validate`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OracleError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: OracleConfig = serde_json::from_str(&raw)
            .map_err(|e| OracleError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would stall or never attempt anything.
    pub fn validate(&self) -> Result<()> {
        let c = &self.client;
        if c.max_in_flight == 0 {
            return Err(OracleError::Config("client.max_in_flight must be at least 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(OracleError::Config("client.max_attempts must be at least 1".into()));
        }
        if c.submit_timeout_ms == 0 || c.read_timeout_ms == 0 {
            return Err(OracleError::Config("client timeouts must be non-zero".into()));
        }
        if c.caller.trim().is_empty() {
            return Err(OracleError::Config("client.caller must not be empty".into()));
        }
        Ok(())
    }
}

/// Ledger location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path to the local ledger database.
    pub db_path: PathBuf,

    /// Path to the deployment descriptor.
    pub deployment_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./poh_ledger.db"),
            deployment_path: PathBuf::from("./deployment_info.json"),
        }
    }
}

/// Client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Principal that signs commit transactions.
    pub caller: String,

    /// Maximum rows in flight at once.
    pub max_in_flight: usize,

    /// Deadline for one submission round trip.
    pub submit_timeout_ms: u64,

    /// Deadline for one read round trip.
    pub read_timeout_ms: u64,

    /// Submission attempts per row before giving up as indeterminate.
    pub max_attempts: u32,

    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff_ms: u64,
}

impl ClientConfig {
    pub fn caller(&self) -> Principal {
        Principal::new(self.caller.clone())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Delay before attempt `attempt` (1-based): zero for the first, then
    /// linear in the attempt number, saturating at `Duration::MAX`.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        self.retry_backoff()
            .checked_mul(attempt.saturating_sub(1))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            caller: "oracle-operator".to_string(),
            max_in_flight: 8,
            submit_timeout_ms: 10_000,
            read_timeout_ms: 5_000,
            max_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

/// Input dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Path to the CSV file.
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./stock_data.csv"),
        }
    }
}
