//! # Registry Call Interface
//!
//! Functions on a deployed registry are addressed by a 4-byte selector
//! derived from the function signature, and take positional JSON arguments.
//! The [`registry_interface`] table is what a deployment descriptor publishes
//! so that clients can check compatibility before talking to a contract.
//!
//! | Function | Signature | Kind |
//! |----------|-----------|------|
//! | initialize | `initialize(address)` | transaction |
//! | commit | `commit(string,uint32,bytes32)` | transaction |
//! | get | `get(string,uint32)` | view |
//! | owner | `owner()` | view |
//! | entryCount | `entryCount()` | view |
//! | stateRoot | `stateRoot()` | view |
//! | events | `events()` | view |
//!
//! Dates travel as `yyyymmdd` integers and hashes as `0x`-prefixed hex.

use crate::error::{LedgerError, Result};
use poh_registry::canonicalize::sha256;
use poh_registry::{Commitment, Identity, Principal};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub const INITIALIZE_SIG: &str = "initialize(address)";
pub const COMMIT_SIG: &str = "commit(string,uint32,bytes32)";
pub const GET_SIG: &str = "get(string,uint32)";
pub const OWNER_SIG: &str = "owner()";
pub const ENTRY_COUNT_SIG: &str = "entryCount()";
pub const STATE_ROOT_SIG: &str = "stateRoot()";
pub const EVENTS_SIG: &str = "events()";

/// Length of a contract address in bytes.
pub const ADDRESS_LEN: usize = 20;

// =============================================================================
// Address
// =============================================================================

/// Location of a deployed registry: 20 bytes, rendered as `0x` + 40 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Wraps raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex, also the registry's storage namespace.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::InvalidArguments(format!("address {s:?}: {e}")))?;
        let bytes: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            LedgerError::InvalidArguments(format!("address {s:?}: expected {ADDRESS_LEN} bytes"))
        })?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Selector
// =============================================================================

/// First four bytes of `SHA-256(signature)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector([u8; 4]);

impl Selector {
    /// Derives the selector for a function signature.
    pub fn of(signature: &str) -> Self {
        let digest = sha256(signature.as_bytes());
        Selector([digest[0], digest[1], digest[2], digest[3]])
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Selector {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::InvalidArguments(format!("selector {s:?}: {e}")))?;
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| {
                LedgerError::InvalidArguments(format!("selector {s:?}: expected 4 bytes"))
            })?;
        Ok(Selector(bytes))
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Interface Description
// =============================================================================

/// Whether a function changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    View,
    Transaction,
}

/// A named, typed parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name as published (camelCase).
    pub name: String,
    /// ABI type name, e.g. `string`, `uint32`, `bytes32`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Param {
    fn new(name: &str, kind: &str) -> Self {
        Param {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// One entry of a published contract interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name, e.g. `commit`.
    pub name: String,
    /// Canonical signature the selector is derived from.
    pub signature: String,
    /// `Selector::of(signature)`; checked on load.
    pub selector: Selector,
    /// Positional arguments.
    pub inputs: Vec<Param>,
    /// Return values; empty for transactions.
    pub outputs: Vec<Param>,
    pub mutability: Mutability,
}

impl FunctionDescriptor {
    fn new(
        name: &str,
        signature: &str,
        inputs: Vec<Param>,
        outputs: Vec<Param>,
        mutability: Mutability,
    ) -> Self {
        FunctionDescriptor {
            name: name.to_string(),
            signature: signature.to_string(),
            selector: Selector::of(signature),
            inputs,
            outputs,
            mutability,
        }
    }
}

/// The full registry interface, in declaration order.
pub fn registry_interface() -> Vec<FunctionDescriptor> {
    use Mutability::{Transaction, View};
    vec![
        FunctionDescriptor::new(
            "initialize",
            INITIALIZE_SIG,
            vec![Param::new("owner", "address")],
            vec![],
            Transaction,
        ),
        FunctionDescriptor::new(
            "commit",
            COMMIT_SIG,
            vec![
                Param::new("entityId", "string"),
                Param::new("asOfDate", "uint32"),
                Param::new("commitment", "bytes32"),
            ],
            vec![],
            Transaction,
        ),
        FunctionDescriptor::new(
            "get",
            GET_SIG,
            vec![Param::new("entityId", "string"), Param::new("asOfDate", "uint32")],
            vec![Param::new("commitment", "bytes32")],
            View,
        ),
        FunctionDescriptor::new(
            "owner",
            OWNER_SIG,
            vec![],
            vec![Param::new("owner", "address")],
            View,
        ),
        FunctionDescriptor::new(
            "entryCount",
            ENTRY_COUNT_SIG,
            vec![],
            vec![Param::new("count", "uint64")],
            View,
        ),
        FunctionDescriptor::new(
            "stateRoot",
            STATE_ROOT_SIG,
            vec![],
            vec![Param::new("root", "bytes32")],
            View,
        ),
        FunctionDescriptor::new(
            "events",
            EVENTS_SIG,
            vec![],
            vec![Param::new("events", "tuple[]")],
            View,
        ),
    ]
}

// =============================================================================
// Typed Calls
// =============================================================================

/// A state-changing registry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Initialize { owner: Principal },
    Commit { identity: Identity, commitment: Commitment },
}

impl RegistryCall {
    /// Selector of the function this call invokes.
    pub fn selector(&self) -> Selector {
        match self {
            RegistryCall::Initialize { .. } => Selector::of(INITIALIZE_SIG),
            RegistryCall::Commit { .. } => Selector::of(COMMIT_SIG),
        }
    }

    /// Positional JSON arguments.
    pub fn args(&self) -> Value {
        match self {
            RegistryCall::Initialize { owner } => json!([owner.as_str()]),
            RegistryCall::Commit { identity, commitment } => json!([
                identity.entity_id(),
                identity.date_code(),
                commitment.to_hex()
            ]),
        }
    }

    /// Decodes a transaction from its selector and arguments.
    ///
    /// # Errors
    ///
    /// - `UnknownSelector` if the selector is not a transaction function
    /// - `InvalidArguments` if the arguments do not fit the signature
    pub fn decode(selector: Selector, args: &Value) -> Result<Self> {
        if selector == Selector::of(INITIALIZE_SIG) {
            let [owner] = positional::<1>(args)?;
            Ok(RegistryCall::Initialize {
                owner: Principal::new(string_arg(owner, "owner")?),
            })
        } else if selector == Selector::of(COMMIT_SIG) {
            let [entity, date, commitment] = positional::<3>(args)?;
            Ok(RegistryCall::Commit {
                identity: identity_arg(entity, date)?,
                commitment: commitment_arg(commitment)?,
            })
        } else {
            Err(LedgerError::UnknownSelector(selector))
        }
    }
}

/// A read-only registry query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryQuery {
    Get { identity: Identity },
    Owner,
    EntryCount,
    StateRoot,
    Events,
}

impl RegistryQuery {
    pub fn selector(&self) -> Selector {
        Selector::of(match self {
            RegistryQuery::Get { .. } => GET_SIG,
            RegistryQuery::Owner => OWNER_SIG,
            RegistryQuery::EntryCount => ENTRY_COUNT_SIG,
            RegistryQuery::StateRoot => STATE_ROOT_SIG,
            RegistryQuery::Events => EVENTS_SIG,
        })
    }

    /// Positional JSON arguments; empty for everything but `Get`.
    pub fn args(&self) -> Value {
        match self {
            RegistryQuery::Get { identity } => json!([identity.entity_id(), identity.date_code()]),
            _ => json!([]),
        }
    }

    /// Decodes a query from its selector and arguments.
    pub fn decode(selector: Selector, args: &Value) -> Result<Self> {
        if selector == Selector::of(GET_SIG) {
            let [entity, date] = positional::<2>(args)?;
            return Ok(RegistryQuery::Get {
                identity: identity_arg(entity, date)?,
            });
        }

        let query = if selector == Selector::of(OWNER_SIG) {
            RegistryQuery::Owner
        } else if selector == Selector::of(ENTRY_COUNT_SIG) {
            RegistryQuery::EntryCount
        } else if selector == Selector::of(STATE_ROOT_SIG) {
            RegistryQuery::StateRoot
        } else if selector == Selector::of(EVENTS_SIG) {
            RegistryQuery::Events
        } else {
            return Err(LedgerError::UnknownSelector(selector));
        };
        positional::<0>(args)?;
        Ok(query)
    }
}

// =============================================================================
// Argument Decoding
// =============================================================================

fn positional<const N: usize>(args: &Value) -> Result<[&Value; N]> {
    let items = args
        .as_array()
        .ok_or_else(|| LedgerError::InvalidArguments("arguments must be a JSON array".into()))?;
    if items.len() != N {
        return Err(LedgerError::InvalidArguments(format!(
            "expected {N} arguments, got {}",
            items.len()
        )));
    }
    let refs: Vec<&Value> = items.iter().collect();
    refs.try_into()
        .map_err(|_| LedgerError::InvalidArguments("argument arity".into()))
}

fn string_arg<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidArguments(format!("{name} must be a string")))
}

fn identity_arg(entity: &Value, date: &Value) -> Result<Identity> {
    let entity = string_arg(entity, "entityId")?;
    let code = date
        .as_u64()
        .and_then(|d| u32::try_from(d).ok())
        .ok_or_else(|| LedgerError::InvalidArguments("asOfDate must be a uint32".into()))?;
    Identity::from_date_code(entity, code).map_err(|e| LedgerError::InvalidArguments(e.to_string()))
}

fn commitment_arg(value: &Value) -> Result<Commitment> {
    string_arg(value, "commitment")?
        .parse()
        .map_err(|e: poh_registry::RegistryError| LedgerError::InvalidArguments(e.to_string()))
}
