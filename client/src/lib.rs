//! Connectkit Client Library
//!
//! This library implements the wallet connection client behind a connect
//! modal. It keeps one connection state in sync with whichever wallet
//! provider is active, derives the public session from it, negotiates
//! network switches and discovers announced wallets.
//!
//! # Features
//!
//! - **Provider sync**: one connection store fed by relay, injected, announced and vendor providers
//! - **Session state**: CAIP address, selected network, balance and profile for the UI
//! - **Network switching**: switch, or register chains the wallet does not know yet
//! - **Discovery**: collects wallets announced over the discovery handshake
//! - **Restoration**: reconnects the previously chosen wallet on startup
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use connectkit_client::memory::{MemoryProvider, MemoryRelayFactory};
//! use connectkit_client::ModalClient;
//! use connectkit_core::ClientConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .with_project_id("my-project")
//!         .with_chains(vec![1, 137])
//!         .build();
//!
//!     let relay = Arc::new(MemoryProvider::new());
//!     let client = ModalClient::builder(config)
//!         .with_relay_factory(Arc::new(MemoryRelayFactory::new(relay)))
//!         .build()?;
//!     client.ready().await;
//!
//!     client.connect_relay(|uri| println!("Scan {}", uri)).await?;
//!     println!("{:?}", client.get_state().caip_address);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod client;
pub mod discovery;
pub mod engine;
pub mod events;
pub mod memory;
pub mod network;
pub mod provider;
pub mod registry;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use client::{ApprovedNetworks, ModalClient, ModalClientBuilder};
pub use discovery::{AnnounceEvent, DiscoveryChannel, LocalDiscoveryChannel, ProviderInfo};
pub use engine::{EngineContext, SyncEngine};
pub use events::Subscription;
pub use network::{NetworkNegotiator, SwitchOutcome};
pub use provider::{
    ProviderError, ProviderEvent, ProviderEventKind, ProviderHandle, RelayProvider,
    RelayProviderFactory, RelayProviderOptions, RequestArguments, VendorProvider, WalletProvider,
};
pub use registry::{Connector, ConnectorRegistry};
pub use session::{PublicState, SessionState};
pub use store::{ConnectionKey, ConnectionState, ConnectionStore};

/// Prelude module for easy importing of common types
pub mod prelude {
    pub use super::{
        ApprovedNetworks, Connector, ModalClient, ProviderError, ProviderEvent, ProviderHandle,
        PublicState, RelayProvider, RequestArguments, SwitchOutcome, VendorProvider,
        WalletProvider,
    };
    pub use connectkit_core::prelude::*;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name
pub const NAME: &str = "connectkit-client";
