//! Connectkit Core Library
//!
//! This library provides the building blocks shared by the connectkit
//! wallet connection client: chain-agnostic identifiers, the chain metadata
//! registry, configuration, persisted client state and the remote lookups
//! used to enrich a connected session.
//!
//! # Features
//!
//! - **CAIP identifiers**: parse and format network ids and chain-qualified addresses
//! - **Chain registry**: names, RPC endpoints, currencies and explorers per chain
//! - **Configuration**: YAML/JSON configuration with a fluent builder
//! - **Persisted state**: remembers the last active connector across restarts
//! - **Lookups**: native balance over JSON-RPC, profile name/avatar over the identity API
//!
//! # Quick Start
//!
//! ```
//! use connectkit_core::{CaipAddress, ChainRegistry};
//!
//! let registry = ChainRegistry::with_presets();
//! let caip = CaipAddress::eip155(137, "0x52908400098527886E0F7030069857D2E4169EE7");
//!
//! println!("{} on {:?}", caip, registry.name(137));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod chains;
pub mod config;
pub mod error;
pub mod rpc;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use chains::{AddChainParams, ChainInfo, ChainRegistry};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use rpc::{BalanceFetcher, Profile, ProfileResolver};
pub use storage::{FileStore, MemoryStore, PersistentStore, WALLET_CHOICE_KEY};
pub use types::{CaipAddress, CaipNetwork, CaipNetworkId, ConnectorType, Namespace, ProviderKind};

/// Prelude module for easy importing of common types
pub mod prelude {
    pub use super::{
        AddChainParams, BalanceFetcher, CaipAddress, CaipNetwork, CaipNetworkId, ChainInfo,
        ChainRegistry, ClientConfig, ConnectorType, Error, Namespace, PersistentStore, Profile,
        ProfileResolver, ProviderKind, Result,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name
pub const NAME: &str = "connectkit-core";
