//! Wallet discovery handshake
//!
//! Wallets announce themselves on a shared channel with an `announceProvider`
//! event carrying their metadata and provider. A listener that joins late
//! broadcasts `requestProvider`, and every wallet present answers with a
//! fresh announcement.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::events::{Listeners, Subscription};
use crate::provider::WalletProvider;

/// Event wallets announce themselves with
pub const ANNOUNCE_PROVIDER_EVENT: &str = "eip6963:announceProvider";
/// Event asking present wallets to announce themselves
pub const REQUEST_PROVIDER_EVENT: &str = "eip6963:requestProvider";

/// Metadata of an announced wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Unique id of this announcement source
    pub uuid: String,
    /// Display name, also the persisted wallet choice
    pub name: String,
    /// Icon as a data URI
    pub icon: String,
    /// Reverse DNS identifier, e.g. `io.metamask`
    pub rdns: String,
}

impl ProviderInfo {
    /// Metadata with a freshly generated uuid
    pub fn new(name: impl Into<String>, icon: impl Into<String>, rdns: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            name: name.into(),
            icon: icon.into(),
            rdns: rdns.into(),
        }
    }
}

/// One announcement
#[derive(Clone)]
pub struct AnnounceEvent {
    /// Wallet metadata
    pub info: ProviderInfo,
    /// Wallet provider
    pub provider: Arc<dyn WalletProvider>,
}

impl AnnounceEvent {
    /// Create an announcement
    pub fn new(info: ProviderInfo, provider: Arc<dyn WalletProvider>) -> Self {
        Self { info, provider }
    }
}

impl std::fmt::Debug for AnnounceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnounceEvent")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Announcement listener
pub type AnnounceHandler = Arc<dyn Fn(&AnnounceEvent) + Send + Sync>;

/// Shared channel carrying the discovery handshake
pub trait DiscoveryChannel: Send + Sync {
    /// Listen for announcements
    fn listen(&self, handler: AnnounceHandler) -> Subscription;

    /// Ask every present wallet to announce itself
    fn request_announcements(&self);
}

/// Discovery channel local to the process
///
/// Wallets registered with [`LocalDiscoveryChannel::register`] answer every
/// announcement request synchronously.
pub struct LocalDiscoveryChannel {
    listeners: Listeners<(), AnnounceHandler>,
    wallets: Mutex<Vec<AnnounceEvent>>,
}

impl LocalDiscoveryChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            wallets: Mutex::new(Vec::new()),
        }
    }

    /// Make a wallet present on the channel without announcing it yet
    pub fn register(&self, event: AnnounceEvent) {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Broadcast an announcement to every listener
    pub fn announce(&self, event: &AnnounceEvent) {
        debug!("{} {}", ANNOUNCE_PROVIDER_EVENT, event.info.name);
        for handler in self.listeners.matching(|_| true) {
            handler(event);
        }
    }
}

impl Default for LocalDiscoveryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryChannel for LocalDiscoveryChannel {
    fn listen(&self, handler: AnnounceHandler) -> Subscription {
        self.listeners.add((), handler)
    }

    fn request_announcements(&self) {
        debug!("{}", REQUEST_PROVIDER_EVENT);
        let wallets = self
            .wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for wallet in &wallets {
            self.announce(wallet);
        }
    }
}
