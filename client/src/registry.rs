//! Connector registry
//!
//! Holds the connectors offered to the user: the static ones (relay,
//! injected, vendor) known at construction, plus every wallet announced over
//! discovery while the announcement window was open.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info};

use connectkit_core::types::{
    DISCOVERY_CONNECTOR_ID, INJECTED_CONNECTOR_ID, VENDOR_CONNECTOR_ID,
    WALLET_CONNECT_CONNECTOR_ID,
};
use connectkit_core::ConnectorType;

use crate::discovery::{AnnounceEvent, DiscoveryChannel, ProviderInfo};
use crate::events::Subscription;
use crate::provider::WalletProvider;

/// Connector offered in the connect view
#[derive(Clone)]
pub struct Connector {
    /// Connector id; every discovery wallet shares the discovery id
    pub id: String,
    /// Display type
    pub kind: ConnectorType,
    /// Display name
    pub name: String,
    /// Image id in the asset service
    pub image_id: Option<String>,
    /// Image URL, the announced icon for discovery wallets
    pub image_url: Option<String>,
    /// Wallet explorer id
    pub explorer_id: Option<String>,
    /// Announcement metadata
    pub info: Option<ProviderInfo>,
    /// Announced provider
    pub provider: Option<Arc<dyn WalletProvider>>,
}

/// Asset service image id of a static connector
fn preset_image_id(id: &str) -> Option<&'static str> {
    match id {
        WALLET_CONNECT_CONNECTOR_ID => Some("ef1a1fcf-7fe8-4d69-bd6d-fda1345b4400"),
        INJECTED_CONNECTOR_ID => Some("07ba87ed-43aa-4adf-4540-9e6a2b9cae00"),
        VENDOR_CONNECTOR_ID => Some("0c2840c3-5b04-4c44-9661-fbd4b49e1800"),
        _ => None,
    }
}

/// Wallet explorer id of a static connector
fn preset_explorer_id(id: &str) -> Option<&'static str> {
    match id {
        VENDOR_CONNECTOR_ID => {
            Some("fd20dc426fb37566d803205b19bbc1d4096b248ac04548e3cfb6b3a38bd033aa")
        }
        _ => None,
    }
}

impl Connector {
    fn preset(id: &str, kind: ConnectorType, name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            name: name.to_string(),
            image_id: preset_image_id(id).map(str::to_string),
            image_url: None,
            explorer_id: preset_explorer_id(id).map(str::to_string),
            info: None,
            provider: None,
        }
    }

    /// Relay connector
    pub fn wallet_connect() -> Self {
        Self::preset(WALLET_CONNECT_CONNECTOR_ID, ConnectorType::WalletConnect, "WalletConnect")
    }

    /// Injected extension connector
    pub fn injected() -> Self {
        Self::preset(INJECTED_CONNECTOR_ID, ConnectorType::Injected, "Browser Wallet")
    }

    /// Vendor SDK connector
    pub fn vendor() -> Self {
        Self::preset(VENDOR_CONNECTOR_ID, ConnectorType::External, "Coinbase")
    }

    /// Connector for an announced wallet
    pub fn announced(event: &AnnounceEvent) -> Self {
        Self {
            id: DISCOVERY_CONNECTOR_ID.to_string(),
            kind: ConnectorType::Announced,
            name: event.info.name.clone(),
            image_id: None,
            image_url: Some(event.info.icon.clone()),
            explorer_id: None,
            info: Some(event.info.clone()),
            provider: Some(event.provider.clone()),
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Static connectors for the configured adapters; the relay is always offered
pub fn static_connectors(has_injected: bool, has_vendor: bool) -> Vec<Connector> {
    let mut connectors = vec![Connector::wallet_connect()];
    if has_injected {
        connectors.push(Connector::injected());
    }
    if has_vendor {
        connectors.push(Connector::vendor());
    }
    connectors
}

/// Registry of available connectors
pub struct ConnectorRegistry {
    connectors: watch::Sender<Vec<Connector>>,
    announced: Mutex<Vec<(String, Arc<dyn WalletProvider>)>>,
    seen_uuids: Mutex<HashSet<String>>,
    sealed: AtomicBool,
    listener: Mutex<Option<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectorRegistry {
    /// Create a registry holding `connectors`
    pub fn new(connectors: Vec<Connector>) -> Self {
        let (tx, _rx) = watch::channel(connectors);
        Self {
            connectors: tx,
            announced: Mutex::new(Vec::new()),
            seen_uuids: Mutex::new(HashSet::new()),
            sealed: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Current connectors, in the order they were added
    pub fn connectors(&self) -> Vec<Connector> {
        self.connectors.borrow().clone()
    }

    /// Receiver notified when a connector is added
    pub fn subscribe(&self) -> watch::Receiver<Vec<Connector>> {
        self.connectors.subscribe()
    }

    /// Whether the announcement window has closed
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Provider announced under `name`
    pub fn find_announced(&self, name: &str) -> Option<Arc<dyn WalletProvider>> {
        lock(&self.announced)
            .iter()
            .find(|(announced, _)| announced == name)
            .map(|(_, provider)| provider.clone())
    }

    /// Record an announcement; returns whether a connector was added
    ///
    /// Ignored once the window is sealed, and for a uuid already seen.
    pub fn handle_announcement(&self, event: &AnnounceEvent) -> bool {
        if self.is_sealed() {
            debug!("Ignoring late announcement from {}", event.info.name);
            return false;
        }
        if !lock(&self.seen_uuids).insert(event.info.uuid.clone()) {
            debug!("Ignoring repeated announcement from {}", event.info.name);
            return false;
        }

        info!("Discovered wallet {} ({})", event.info.name, event.info.rdns);
        lock(&self.announced).push((event.info.name.clone(), event.provider.clone()));
        self.connectors
            .send_modify(|connectors| connectors.push(Connector::announced(event)));
        true
    }

    /// Listen on `channel`, ask present wallets to announce themselves, then
    /// seal the window; does nothing after the first call
    pub fn listen(self: &Arc<Self>, channel: &dyn DiscoveryChannel) {
        if self.is_sealed() || lock(&self.listener).is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = channel.listen(Arc::new(move |event: &AnnounceEvent| {
            if let Some(registry) = weak.upgrade() {
                registry.handle_announcement(event);
            }
        }));
        *lock(&self.listener) = Some(subscription);

        channel.request_announcements();
        self.sealed.store(true, Ordering::SeqCst);
        debug!("Discovery window sealed");
    }
}
