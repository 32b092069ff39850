//! Core data types for connectkit
//!
//! This module defines the chain-agnostic identifiers used throughout the
//! workspace: CAIP-2 network ids, CAIP-10 chain-qualified addresses, provider
//! kinds and connector descriptors' display types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connector id of the relay-based provider
pub const WALLET_CONNECT_CONNECTOR_ID: &str = "walletConnect";
/// Connector id of the injected provider
pub const INJECTED_CONNECTOR_ID: &str = "injected";
/// Connector id shared by every discovery-announced provider
pub const DISCOVERY_CONNECTOR_ID: &str = "eip6963";
/// Connector id of the first-party vendor provider
pub const VENDOR_CONNECTOR_ID: &str = "coinbaseWallet";

/// Wallet method used to switch the active chain
pub const SWITCH_CHAIN_METHOD: &str = "wallet_switchEthereumChain";
/// Wallet method used to register an unknown chain
pub const ADD_CHAIN_METHOD: &str = "wallet_addEthereumChain";
/// Wallet method used to ask for account access
pub const REQUEST_ACCOUNTS_METHOD: &str = "eth_requestAccounts";

/// Blockchain namespace (CAIP-2 namespace component)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// EVM chains
    Eip155,
    /// Solana clusters
    Solana,
}

impl Namespace {
    /// Get the namespace as it appears in CAIP identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Eip155 => "eip155",
            Namespace::Solana => "solana",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eip155" => Ok(Namespace::Eip155),
            "solana" => Ok(Namespace::Solana),
            other => Err(Error::InvalidChainId(format!(
                "Unknown namespace: {}",
                other
            ))),
        }
    }
}

/// CAIP-2 network identifier, e.g. `eip155:137`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaipNetworkId {
    /// Namespace component
    pub namespace: Namespace,
    /// Chain reference (decimal chain id for EVM, genesis hash prefix for Solana)
    pub reference: String,
}

impl CaipNetworkId {
    /// Create an EVM network id from a numeric chain id
    pub fn eip155(chain_id: u64) -> Self {
        Self {
            namespace: Namespace::Eip155,
            reference: chain_id.to_string(),
        }
    }

    /// Numeric chain id, only defined for EVM networks
    pub fn chain_id(&self) -> Option<u64> {
        match self.namespace {
            Namespace::Eip155 => self.reference.parse().ok(),
            Namespace::Solana => None,
        }
    }
}

impl fmt::Display for CaipNetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for CaipNetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidChainId(format!("Not a CAIP-2 id: {}", s)))?;

        if reference.is_empty() || reference.contains(':') {
            return Err(Error::InvalidChainId(format!("Not a CAIP-2 id: {}", s)));
        }

        Ok(Self {
            namespace: namespace.parse()?,
            reference: reference.to_string(),
        })
    }
}

impl TryFrom<String> for CaipNetworkId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CaipNetworkId> for String {
    fn from(value: CaipNetworkId) -> Self {
        value.to_string()
    }
}

/// CAIP-10 chain-qualified account address, e.g. `eip155:1:0xab..`
///
/// Always derived from its parts; consumers re-derive it after a chain or
/// account change instead of holding on to an old value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaipAddress {
    /// Network the account lives on
    pub network: CaipNetworkId,
    /// Account address
    pub address: String,
}

impl CaipAddress {
    /// Build a chain-qualified address from its parts
    pub fn new(network: CaipNetworkId, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }

    /// Build an EVM chain-qualified address
    pub fn eip155(chain_id: u64, address: impl Into<String>) -> Self {
        Self::new(CaipNetworkId::eip155(chain_id), address)
    }
}

impl fmt::Display for CaipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}

impl FromStr for CaipAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (network, address) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("Not a CAIP-10 address: {}", s)))?;
        let network: CaipNetworkId = network.parse()?;

        if address.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "Not a CAIP-10 address: {}",
                s
            )));
        }
        if network.namespace == Namespace::Eip155 && !is_evm_address(address) {
            return Err(Error::InvalidAddress(format!(
                "Not an EVM address: {}",
                address
            )));
        }

        Ok(Self::new(network, address))
    }
}

impl TryFrom<String> for CaipAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CaipAddress> for String {
    fn from(value: CaipAddress) -> Self {
        value.to_string()
    }
}

/// Check that a string is a `0x`-prefixed 20 byte hex address
pub fn is_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => matches!(hex::decode(body), Ok(bytes) if bytes.len() == 20),
        None => false,
    }
}

/// Format a chain id the way wallets expect it in RPC params (`0x89`)
pub fn chain_id_to_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

/// Parse a chain id given as `0x`-prefixed hex or decimal text
pub fn parse_chain_id(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex_digits) => Ok(u64::from_str_radix(hex_digits, 16)?),
        None => Ok(raw.parse::<u64>()?),
    }
}

/// Normalize a chain id carried by a provider event payload.
///
/// Wallets report chain ids as hex strings, decimal strings or numbers.
pub fn chain_id_from_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => parse_chain_id(s).ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Kind of the provider behind the active connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote session-relay provider
    Relay,
    /// Provider injected into the page by an extension
    Injected,
    /// Provider announced over the discovery handshake
    Discovery,
    /// First-party vendor provider
    Vendor,
    /// No active provider
    #[default]
    None,
}

impl ProviderKind {
    /// Connector id persisted for this kind
    pub fn connector_id(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Relay => Some(WALLET_CONNECT_CONNECTOR_ID),
            ProviderKind::Injected => Some(INJECTED_CONNECTOR_ID),
            ProviderKind::Discovery => Some(DISCOVERY_CONNECTOR_ID),
            ProviderKind::Vendor => Some(VENDOR_CONNECTOR_ID),
            ProviderKind::None => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Relay => "relay",
            ProviderKind::Injected => "injected",
            ProviderKind::Discovery => "discovery",
            ProviderKind::Vendor => "vendor",
            ProviderKind::None => "none",
        };
        f.write_str(name)
    }
}

/// Display type of a connector in the connect view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorType {
    /// Relay (QR code / deep link) connector
    WalletConnect,
    /// Injected browser extension
    Injected,
    /// Discovery-announced wallet
    Announced,
    /// Vendor SDK connector
    External,
}

/// Network descriptor shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaipNetwork {
    /// CAIP-2 id
    pub id: CaipNetworkId,
    /// Display name, absent for unknown chains
    pub name: Option<String>,
    /// Image id in the asset service
    pub image_id: Option<String>,
    /// Caller supplied image URL
    pub image_url: Option<String>,
}

/// Token shown in place of the native currency for a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token contract address
    pub address: String,
    /// Optional token image URL
    pub image: Option<String>,
}
