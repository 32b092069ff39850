//! Chain registry lookup
//!
//! Maps numeric EVM chain ids to display metadata, RPC endpoints, native
//! currency symbols and block explorers. Every field is optional: a chain
//! missing a field degrades gracefully (no balance, no explorer link) rather
//! than producing an error.
//!
//! # Example
//!
//! ```
//! use connectkit_core::chains::ChainRegistry;
//!
//! let registry = ChainRegistry::with_presets();
//! assert_eq!(registry.name(137), Some("Polygon"));
//! assert_eq!(
//!     registry.address_explorer_url(1, "0xabc").as_deref(),
//!     Some("https://etherscan.io/address/0xabc")
//! );
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::{chain_id_to_hex, CaipNetwork, CaipNetworkId};

/// Metadata known about one EVM chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Numeric chain id
    pub chain_id: u64,
    /// Display name
    pub name: Option<String>,
    /// Public JSON-RPC endpoint
    pub rpc_url: Option<String>,
    /// Native currency symbol
    pub currency: Option<String>,
    /// Block explorer base URL (no trailing slash)
    pub explorer_url: Option<String>,
    /// Image id in the asset service
    pub image_id: Option<String>,
}

impl ChainInfo {
    /// Create a fully described chain
    pub fn new(
        chain_id: u64,
        name: impl Into<String>,
        rpc_url: impl Into<String>,
        currency: impl Into<String>,
        explorer_url: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            name: Some(name.into()),
            rpc_url: Some(rpc_url.into()),
            currency: Some(currency.into()),
            explorer_url: Some(explorer_url.into()),
            image_id: None,
        }
    }

    /// Set the asset service image id
    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }
}

static PRESETS: Lazy<Vec<ChainInfo>> = Lazy::new(|| {
    vec![
        ChainInfo::new(1, "Ethereum", "https://cloudflare-eth.com", "ETH", "https://etherscan.io"),
        ChainInfo::new(10, "Optimism", "https://mainnet.optimism.io", "ETH", "https://optimistic.etherscan.io"),
        ChainInfo::new(56, "Binance Smart Chain", "https://bsc-dataseed.binance.org", "BNB", "https://bscscan.com"),
        ChainInfo::new(100, "Gnosis", "https://rpc.gnosischain.com", "xDAI", "https://gnosisscan.io"),
        ChainInfo::new(137, "Polygon", "https://polygon-rpc.com", "MATIC", "https://polygonscan.com"),
        ChainInfo::new(250, "Fantom", "https://rpc.ftm.tools", "FTM", "https://ftmscan.com"),
        ChainInfo::new(324, "zkSync", "https://mainnet.era.zksync.io", "ETH", "https://explorer.zksync.io"),
        ChainInfo::new(8453, "Base", "https://mainnet.base.org", "ETH", "https://basescan.org"),
        ChainInfo::new(42161, "Arbitrum", "https://arb1.arbitrum.io/rpc", "ETH", "https://arbiscan.io"),
        ChainInfo::new(42220, "Celo", "https://forno.celo.org", "CELO", "https://explorer.celo.org/mainnet"),
        ChainInfo::new(43114, "Avalanche", "https://api.avax.network/ext/bc/C/rpc", "AVAX", "https://snowtrace.io"),
        ChainInfo::new(1313161554, "Aurora", "https://mainnet.aurora.dev", "ETH", "https://explorer.aurora.dev"),
        ChainInfo::new(11155111, "Sepolia", "https://rpc.sepolia.org", "ETH", "https://sepolia.etherscan.io"),
    ]
});

/// Native currency block of a chain registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Currency name
    pub name: String,
    /// Currency symbol
    pub symbol: String,
    /// Decimals (always 18 for EVM natives)
    pub decimals: u8,
}

/// Parameters of a chain registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex chain id
    pub chain_id: String,
    /// Display name
    pub chain_name: String,
    /// Native currency
    pub native_currency: NativeCurrency,
    /// RPC endpoints
    pub rpc_urls: Vec<String>,
    /// Explorer URLs
    pub block_explorer_urls: Vec<String>,
}

/// Chain id keyed metadata table
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainInfo>,
    images: HashMap<u64, String>,
}

impl ChainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in chain presets
    pub fn with_presets() -> Self {
        let mut registry = Self::new();
        for chain in PRESETS.iter() {
            registry.insert(chain.clone());
        }
        registry
    }

    /// Add or replace a chain
    pub fn insert(&mut self, chain: ChainInfo) {
        self.chains.insert(chain.chain_id, chain);
    }

    /// Attach caller supplied image URLs to chains
    pub fn with_images(mut self, images: HashMap<u64, String>) -> Self {
        self.images.extend(images);
        self
    }

    /// Look up a chain
    pub fn get(&self, chain_id: u64) -> Option<&ChainInfo> {
        self.chains.get(&chain_id)
    }

    /// All known chains ordered by chain id
    pub fn chains(&self) -> Vec<&ChainInfo> {
        let mut chains: Vec<_> = self.chains.values().collect();
        chains.sort_by_key(|chain| chain.chain_id);
        chains
    }

    /// Display name of a chain
    pub fn name(&self, chain_id: u64) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.name.as_deref())
    }

    /// RPC URL of a chain
    pub fn rpc_url(&self, chain_id: u64) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.rpc_url.as_deref())
    }

    /// Native currency symbol of a chain
    pub fn currency(&self, chain_id: u64) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.currency.as_deref())
    }

    /// Explorer base URL of a chain
    pub fn explorer_url(&self, chain_id: u64) -> Option<&str> {
        self.get(chain_id).and_then(|c| c.explorer_url.as_deref())
    }

    /// Explorer page of an address, absent when the chain has no explorer
    pub fn address_explorer_url(&self, chain_id: u64, address: &str) -> Option<String> {
        self.explorer_url(chain_id)
            .map(|base| format!("{}/address/{}", base.trim_end_matches('/'), address))
    }

    /// Network descriptor of a chain; unknown chains keep their id only
    pub fn network(&self, chain_id: u64) -> CaipNetwork {
        CaipNetwork {
            id: CaipNetworkId::eip155(chain_id),
            name: self.name(chain_id).map(str::to_string),
            image_id: self.get(chain_id).and_then(|c| c.image_id.clone()),
            image_url: self.images.get(&chain_id).cloned(),
        }
    }

    /// Registration request for a chain, if enough is known to build one
    pub fn add_chain_params(&self, chain_id: u64) -> Option<AddChainParams> {
        let chain = self.get(chain_id)?;
        let name = chain.name.clone()?;
        let symbol = chain.currency.clone()?;
        let rpc_url = chain.rpc_url.clone()?;

        Some(AddChainParams {
            chain_id: chain_id_to_hex(chain_id),
            chain_name: name,
            native_currency: NativeCurrency {
                name: symbol.clone(),
                symbol,
                decimals: 18,
            },
            rpc_urls: vec![rpc_url],
            block_explorer_urls: chain.explorer_url.iter().cloned().collect(),
        })
    }
}
