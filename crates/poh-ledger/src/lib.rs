//! # Proof-of-History Ledger - Hosting Registries
//!
//! This crate is the ledger side of the oracle: the interface through which
//! registries are reached ([`LedgerBackend`]), an embedded implementation of
//! it ([`LocalLedger`]), and the artifacts that connect the two
//! ([`DeploymentDescriptor`], [`RegistryContract`]).
//!
//! ## Threat Model
//!
//! | Threat | Description | Defense |
//! |--------|-------------|---------|
//! | Wrong contract | Client talks to a registry with another interface | Descriptor interface check |
//! | Lost outcome | Round trip times out after the write landed | `Timeout` is distinct from failure |
//! | Reordering | Two transactions interleave inside the registry | Sequencer lock, one block per tx |
//! | Silent overwrite | Redeploy clobbers the descriptor | Descriptor save refuses without overwrite |
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   selector + JSON args   ┌─────────────────────────┐
//! │ RegistryContract   │─────────────────────────▶│ dyn LedgerBackend       │
//! │ typed commit / get │◀─────────────────────────│  LocalLedger (sled)     │
//! └────────────────────┘   Receipt / JSON value   │  ├─ sequencer + blocks  │
//!                                                 │  └─ Registry per address│
//!                                                 └─────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use poh_ledger::{LocalLedger, RegistryContract};
//! use poh_registry::Principal;
//!
//! # async fn run() -> poh_ledger::Result<()> {
//! let ledger = Arc::new(LocalLedger::open("./poh_ledger.db")?);
//! let descriptor = ledger.deploy(&Principal::new("oracle-operator")).await?;
//! descriptor.save("./deployment_info.json", false)?;
//!
//! let contract = RegistryContract::new(ledger, descriptor.address);
//! assert_eq!(contract.entry_count().await?, 0);
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod backend;
pub mod contract;
pub mod deployment;
pub mod error;
pub mod local;

pub use abi::{registry_interface, Address, FunctionDescriptor, Selector};
pub use backend::{LedgerBackend, Receipt};
pub use contract::RegistryContract;
pub use deployment::DeploymentDescriptor;
pub use error::{LedgerError, Result, RevertReason};
pub use local::LocalLedger;
