//! Deployment descriptors.
//!
//! A descriptor is the JSON artifact written when a registry is deployed. It
//! tells clients where the registry lives, who owns it, and which interface
//! it exposes.

use crate::abi::{registry_interface, Address, FunctionDescriptor};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use poh_registry::Principal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Where a registry is deployed and what it speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub address: Address,
    pub owner: Principal,
    pub interface: Vec<FunctionDescriptor>,
    /// Block the deployment landed in.
    pub block: u64,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentDescriptor {
    /// Builds a descriptor publishing the current registry interface.
    pub fn new(address: Address, owner: Principal, block: u64, deployed_at: DateTime<Utc>) -> Self {
        DeploymentDescriptor {
            address,
            owner,
            interface: registry_interface(),
            block,
            deployed_at,
        }
    }

    /// Reads and validates a descriptor.
    ///
    /// # Errors
    ///
    /// `Descriptor` if the file is missing, malformed, or its interface is
    /// incompatible with this client.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            LedgerError::Descriptor(format!("cannot read {}: {}", path.display(), e))
        })?;
        let descriptor: DeploymentDescriptor = serde_json::from_str(&raw).map_err(|e| {
            LedgerError::Descriptor(format!("malformed descriptor {}: {}", path.display(), e))
        })?;
        descriptor.check_compatible()?;
        debug!(
            path = %path.display(),
            address = %descriptor.address,
            "loaded deployment descriptor"
        );
        Ok(descriptor)
    }

    /// Writes the descriptor as pretty JSON.
    ///
    /// An existing file is only replaced when `overwrite` is set.
    pub fn save<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(LedgerError::Descriptor(format!(
                "{} already exists; refusing to overwrite",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), address = %self.address, "wrote deployment descriptor");
        Ok(())
    }

    /// Looks up a published function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.interface.iter().find(|f| f.name == name)
    }

    /// Every function this client uses must be published with the expected
    /// signature and selector.
    pub fn check_compatible(&self) -> Result<()> {
        for expected in registry_interface() {
            match self.function(&expected.name) {
                Some(found)
                    if found.signature == expected.signature
                        && found.selector == expected.selector => {}
                Some(found) => {
                    return Err(LedgerError::Descriptor(format!(
                        "function {} published as {} ({}), expected {} ({})",
                        expected.name,
                        found.signature,
                        found.selector,
                        expected.signature,
                        expected.selector
                    )))
                }
                None => {
                    return Err(LedgerError::Descriptor(format!(
                        "interface lacks function {}",
                        expected.name
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{Selector, ADDRESS_LEN};

    fn descriptor() -> DeploymentDescriptor {
        DeploymentDescriptor::new(
            Address::from_bytes([0x11; ADDRESS_LEN]),
            Principal::new("oracle-operator"),
            1,
            Utc::now(),
        )
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deployment_info.json");
        let d = descriptor();

        d.save(&path, false).unwrap();
        assert_eq!(DeploymentDescriptor::load(&path).unwrap(), d);
    }

    #[test]
    fn test_refuses_overwrite_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployment_info.json");
        descriptor().save(&path, false).unwrap();

        assert!(matches!(
            descriptor().save(&path, false),
            Err(LedgerError::Descriptor(_))
        ));
        descriptor().save(&path, true).unwrap();
    }

    #[test]
    fn test_missing_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(DeploymentDescriptor::load(&missing), Err(LedgerError::Descriptor(_))));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"address\": 5}").unwrap();
        assert!(matches!(DeploymentDescriptor::load(&bad), Err(LedgerError::Descriptor(_))));
    }

    #[test]
    fn test_incompatible_interface() {
        let mut d = descriptor();
        d.interface.retain(|f| f.name != "get");
        assert!(d.check_compatible().is_err());

        let mut d = descriptor();
        for f in d.interface.iter_mut().filter(|f| f.name == "commit") {
            f.selector = Selector::of("commit(string,uint256,bytes32)");
        }
        assert!(d.check_compatible().is_err());
    }
}
