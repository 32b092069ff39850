//! Modal client facade
//!
//! [`ModalClient`] wires the pieces together: it validates the
//! configuration, owns the connection store, the sync engine, the network
//! negotiator and the connector registry, restores the previous session on
//! startup and exposes the operations the connect view calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use connectkit_core::config::ClientConfig;
use connectkit_core::rpc::{IdentityResolver, JsonRpcClient};
use connectkit_core::types::{
    ADD_CHAIN_METHOD, DISCOVERY_CONNECTOR_ID, INJECTED_CONNECTOR_ID, REQUEST_ACCOUNTS_METHOD,
    VENDOR_CONNECTOR_ID, WALLET_CONNECT_CONNECTOR_ID,
};
use connectkit_core::{
    BalanceFetcher, CaipNetworkId, ChainRegistry, Error, FileStore, Namespace, PersistentStore,
    ProfileResolver, Result, WALLET_CHOICE_KEY,
};

use crate::discovery::DiscoveryChannel;
use crate::engine::{EngineContext, SyncEngine};
use crate::network::{NetworkNegotiator, SwitchOutcome};
use crate::provider::{
    EventHandler, ProviderEvent, ProviderEventKind, ProviderHandle, RelayProvider,
    RelayProviderFactory, RelayProviderOptions, RequestArguments, VendorProvider, WalletProvider,
};
use crate::registry::{static_connectors, Connector, ConnectorRegistry};
use crate::session::{PublicState, SessionState};
use crate::store::{ConnectionState, ConnectionStore};

/// Networks the connected wallet approved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedNetworks {
    /// Approved networks, when the wallet restricts them
    pub approved_caip_network_ids: Option<Vec<CaipNetworkId>>,
    /// Whether the wallet can be asked to add any network
    pub supports_all_networks: bool,
}

/// Builder for [`ModalClient`]
pub struct ModalClientBuilder {
    config: ClientConfig,
    relay_factory: Option<Arc<dyn RelayProviderFactory>>,
    injected: Option<Arc<dyn WalletProvider>>,
    vendor: Option<Arc<dyn VendorProvider>>,
    discovery: Option<Arc<dyn DiscoveryChannel>>,
    persisted: Option<Arc<dyn PersistentStore>>,
    balances: Option<Arc<dyn BalanceFetcher>>,
    profiles: Option<Arc<dyn ProfileResolver>>,
    chains: Option<ChainRegistry>,
}

impl ModalClientBuilder {
    /// Start from a configuration
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            relay_factory: None,
            injected: None,
            vendor: None,
            discovery: None,
            persisted: None,
            balances: None,
            profiles: None,
            chains: None,
        }
    }

    /// Relay provider factory, required
    pub fn with_relay_factory(mut self, factory: Arc<dyn RelayProviderFactory>) -> Self {
        self.relay_factory = Some(factory);
        self
    }

    /// Injected extension provider
    pub fn with_injected(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.injected = Some(provider);
        self
    }

    /// Vendor SDK provider
    pub fn with_vendor(mut self, provider: Arc<dyn VendorProvider>) -> Self {
        self.vendor = Some(provider);
        self
    }

    /// Discovery channel
    pub fn with_discovery(mut self, channel: Arc<dyn DiscoveryChannel>) -> Self {
        self.discovery = Some(channel);
        self
    }

    /// Store for the wallet choice; defaults to a file in the storage directory
    pub fn with_persistent_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.persisted = Some(store);
        self
    }

    /// Balance lookup; defaults to JSON-RPC
    pub fn with_balance_fetcher(mut self, fetcher: Arc<dyn BalanceFetcher>) -> Self {
        self.balances = Some(fetcher);
        self
    }

    /// Profile lookup; defaults to the identity API
    pub fn with_profile_resolver(mut self, resolver: Arc<dyn ProfileResolver>) -> Self {
        self.profiles = Some(resolver);
        self
    }

    /// Chain metadata; defaults to the presets
    pub fn with_chain_registry(mut self, chains: ChainRegistry) -> Self {
        self.chains = Some(chains);
        self
    }

    /// Validate the configuration, build the client and start restoring the
    /// previous session
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<ModalClient> {
        let config = self.config;
        config.validate()?;

        let relay_factory = self
            .relay_factory
            .ok_or_else(|| Error::config("relay provider factory is undefined"))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::state("ModalClient must be built inside a Tokio runtime"))?;

        let persisted: Arc<dyn PersistentStore> = match self.persisted {
            Some(store) => store,
            None => Arc::new(FileStore::new(&config.storage)?),
        };
        let balances: Arc<dyn BalanceFetcher> = match self.balances {
            Some(fetcher) => fetcher,
            None => Arc::new(JsonRpcClient::new(config.request_timeout())?),
        };
        let profiles: Arc<dyn ProfileResolver> = match self.profiles {
            Some(resolver) => resolver,
            None => Arc::new(IdentityResolver::new(
                config.rpc.identity_url.clone(),
                config.project.project_id.clone(),
                config.request_timeout(),
            )?),
        };

        let chains = Arc::new(
            self.chains
                .unwrap_or_else(ChainRegistry::with_presets)
                .with_images(config.networks.chain_images.clone()),
        );

        let session = Arc::new(SessionState::new());
        let default_network = config.networks.default_chain.map(|id| chains.network(id));
        session.set_requested_networks(
            config
                .networks
                .chains
                .iter()
                .map(|id| chains.network(*id))
                .collect(),
        );
        session.set_selected_network(default_network.clone());

        let engine = SyncEngine::new(EngineContext {
            store: Arc::new(ConnectionStore::new()),
            session,
            persisted: persisted.clone(),
            chains: chains.clone(),
            balances,
            profiles,
            tokens: config.networks.tokens.clone(),
            default_network,
        });
        let negotiator = NetworkNegotiator::new(engine.clone(), chains);

        let registry = Arc::new(ConnectorRegistry::new(static_connectors(
            self.injected.is_some(),
            self.vendor.is_some(),
        )));
        if config.connectors.enable_discovery {
            if let Some(channel) = &self.discovery {
                registry.listen(channel.as_ref());
            }
        }

        let inner = Arc::new(ClientInner {
            config,
            engine,
            negotiator,
            registry,
            persisted,
            relay_factory,
            relay: OnceCell::new(),
            injected: self.injected,
            vendor: self.vendor,
        });

        let choice = inner.wallet_choice();
        info!("Starting client, persisted wallet choice: {:?}", choice);
        let startup = runtime.spawn(Arc::clone(&inner).restore(choice));

        Ok(ModalClient {
            inner,
            startup: Arc::new(Mutex::new(Some(startup))),
        })
    }
}

struct ClientInner {
    config: ClientConfig,
    engine: Arc<SyncEngine>,
    negotiator: NetworkNegotiator,
    registry: Arc<ConnectorRegistry>,
    persisted: Arc<dyn PersistentStore>,
    relay_factory: Arc<dyn RelayProviderFactory>,
    relay: OnceCell<Arc<dyn RelayProvider>>,
    injected: Option<Arc<dyn WalletProvider>>,
    vendor: Option<Arc<dyn VendorProvider>>,
}

impl ClientInner {
    fn wallet_choice(&self) -> Option<String> {
        match self.persisted.get(WALLET_CHOICE_KEY) {
            Ok(choice) => choice,
            Err(err) => {
                warn!("Failed to read the wallet choice: {}", err);
                None
            }
        }
    }

    async fn relay_provider(&self) -> Result<Arc<dyn RelayProvider>> {
        let relay = self
            .relay
            .get_or_try_init(|| async {
                debug!("Initializing relay provider");
                let options = RelayProviderOptions::new(
                    self.config.project.project_id.clone(),
                    self.config.networks.chains.clone(),
                    self.config.sdk_version(),
                );
                let relay = self.relay_factory.init(options).await?;
                self.engine.watch_relay(&relay);
                Ok::<_, Error>(relay)
            })
            .await?;
        Ok(Arc::clone(relay))
    }

    async fn restore(self: Arc<Self>, choice: Option<String>) {
        if let Some(choice) = choice.as_deref() {
            self.restore_external(choice).await;
        }

        match self.relay_provider().await {
            Ok(relay) => {
                if choice.as_deref() == Some(WALLET_CONNECT_CONNECTOR_ID) {
                    self.engine.activate(ProviderHandle::Relay(relay)).await;
                }
            }
            Err(err) => warn!("Relay provider initialization failed: {}", err),
        }
    }

    async fn restore_external(&self, choice: &str) {
        if let Some(provider) = self.registry.find_announced(choice) {
            let handle = ProviderHandle::Discovery {
                name: choice.to_string(),
                provider,
            };
            self.engine.activate(handle).await;
            return;
        }

        match choice {
            INJECTED_CONNECTOR_ID => {
                if let Some(injected) = &self.injected {
                    self.engine
                        .activate(ProviderHandle::Injected(Arc::clone(injected)))
                        .await;
                }
            }
            VENDOR_CONNECTOR_ID => {
                if let Some(vendor) = &self.vendor {
                    if vendor.cached_accounts().is_empty() {
                        debug!("Vendor has no cached accounts, clearing the session");
                        self.engine.on_disconnect();
                    } else {
                        self.engine
                            .activate(ProviderHandle::Vendor(Arc::clone(vendor)))
                            .await;
                    }
                }
            }
            _ => {}
        }
    }
}

/// Wallet connection client
#[derive(Clone)]
pub struct ModalClient {
    inner: Arc<ClientInner>,
    startup: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ModalClient {
    /// Start building a client
    pub fn builder(config: ClientConfig) -> ModalClientBuilder {
        ModalClientBuilder::new(config)
    }

    /// Wait until startup restoration has finished
    pub async fn ready(&self) {
        let startup = self.startup.lock().await.take();
        if let Some(startup) = startup {
            if let Err(err) = startup.await {
                warn!("Startup restoration failed: {}", err);
            }
        }
    }

    /// The relay provider, initializing it on first use
    pub async fn relay_provider(&self) -> Result<Arc<dyn RelayProvider>> {
        self.inner.relay_provider().await
    }

    /// Pair with a wallet over the relay
    ///
    /// `on_uri` receives the pairing URI to show as a QR code or deep link.
    #[instrument(skip(self, on_uri))]
    pub async fn connect_relay<F>(&self, on_uri: F) -> Result<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let relay = self.inner.relay_provider().await?;

        let handler: EventHandler = Arc::new(move |event: &ProviderEvent| {
            if let ProviderEvent::DisplayUri(uri) = event {
                on_uri(uri.clone());
            }
        });
        let uri_subscription = relay.on(ProviderEventKind::DisplayUri, handler);

        let connected = relay.connect().await;
        drop(uri_subscription);
        connected?;

        if !self.inner.engine.activate(ProviderHandle::Relay(relay)).await {
            debug!("Relay session carries no account yet");
        }
        Ok(())
    }

    /// Connect through a non-relay connector
    #[instrument(skip(self, connector), fields(id = %connector.id, name = %connector.name))]
    pub async fn connect_external(&self, connector: &Connector) -> Result<()> {
        let handle = match connector.id.as_str() {
            INJECTED_CONNECTOR_ID => {
                let injected = self.inner.injected.clone().ok_or_else(|| {
                    Error::ConnectorNotFound("injected provider is undefined".to_string())
                })?;
                ProviderHandle::Injected(injected)
            }
            VENDOR_CONNECTOR_ID => {
                let vendor = self.inner.vendor.clone().ok_or_else(|| {
                    Error::ConnectorNotFound("vendor provider is undefined".to_string())
                })?;
                ProviderHandle::Vendor(vendor)
            }
            DISCOVERY_CONNECTOR_ID => match (&connector.info, &connector.provider) {
                (Some(info), Some(provider)) => ProviderHandle::Discovery {
                    name: info.name.clone(),
                    provider: Arc::clone(provider),
                },
                _ => {
                    return Err(Error::ConnectorNotFound(format!(
                        "announced connector {} carries no provider",
                        connector.name
                    )))
                }
            },
            WALLET_CONNECT_CONNECTOR_ID => {
                return Err(Error::NotSupported(
                    "relay connections are made with connect_relay".to_string(),
                ))
            }
            other => return Err(Error::ConnectorNotFound(other.to_string())),
        };

        handle
            .request(RequestArguments::without_params(REQUEST_ACCOUNTS_METHOD))
            .await?;
        self.inner.engine.activate(handle).await;
        Ok(())
    }

    /// End the session and forget the wallet choice
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        match self.inner.engine.store().provider() {
            Some(ProviderHandle::Relay(relay)) => relay.disconnect().await?,
            Some(ProviderHandle::Injected(_))
            | Some(ProviderHandle::Discovery { .. })
            | Some(ProviderHandle::Vendor(_))
            | None => {}
        }

        self.inner.engine.on_disconnect();
        info!("Disconnected");
        Ok(())
    }

    /// Ask the connected wallet to switch to `chain_id`
    pub async fn switch_network(&self, chain_id: u64) -> Result<SwitchOutcome> {
        self.inner.negotiator.switch_network(chain_id).await
    }

    /// Switch to a CAIP-2 network; non-EVM ids are ignored
    pub async fn switch_caip_network(&self, network: &CaipNetworkId) -> Result<Option<SwitchOutcome>> {
        if network.namespace != Namespace::Eip155 {
            debug!("Ignoring switch to non-EVM network {}", network);
            return Ok(None);
        }
        match network.chain_id() {
            Some(chain_id) => self.switch_network(chain_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Networks approved by the connected wallet
    pub async fn approved_networks(&self) -> Result<ApprovedNetworks> {
        let relay_chosen = self
            .inner
            .wallet_choice()
            .is_some_and(|choice| choice.contains(WALLET_CONNECT_CONNECTOR_ID));

        if !relay_chosen {
            return Ok(ApprovedNetworks {
                approved_caip_network_ids: None,
                supports_all_networks: true,
            });
        }

        let relay = self.inner.relay_provider().await?;
        let namespace = relay.session_namespace(Namespace::Eip155.as_str());

        Ok(ApprovedNetworks {
            supports_all_networks: namespace
                .as_ref()
                .is_some_and(|ns| ns.methods.iter().any(|method| method == ADD_CHAIN_METHOD)),
            approved_caip_network_ids: namespace.map(|ns| {
                ns.chains
                    .iter()
                    .filter_map(|chain| chain.parse().ok())
                    .collect()
            }),
        })
    }

    /// Whether an injected wallet is installed; with `ids`, whether it
    /// carries any of those flags
    pub fn check_installed(&self, ids: Option<&[&str]>) -> bool {
        let Some(injected) = &self.inner.injected else {
            return false;
        };
        match ids {
            None => true,
            Some(ids) => ids.iter().any(|id| injected.has_flag(id)),
        }
    }

    /// Public session state
    pub fn get_state(&self) -> PublicState {
        self.inner.engine.session().get()
    }

    /// Receiver notified whenever the public state changes
    pub fn subscribe_state(&self) -> watch::Receiver<PublicState> {
        self.inner.engine.session().subscribe()
    }

    /// Connection state snapshot
    pub fn connection(&self) -> ConnectionState {
        self.inner.engine.store().snapshot()
    }

    /// Connectors offered to the user
    pub fn connectors(&self) -> Vec<Connector> {
        self.inner.registry.connectors()
    }

    /// Receiver notified when a connector is added
    pub fn subscribe_connectors(&self) -> watch::Receiver<Vec<Connector>> {
        self.inner.registry.subscribe()
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{AnnounceEvent, LocalDiscoveryChannel, ProviderInfo};
    use crate::memory::{MemoryProvider, MemoryRelayFactory};
    use crate::provider::{ProviderError, SessionNamespace};
    use async_trait::async_trait;
    use connectkit_core::{MemoryStore, Profile, ProviderKind};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const ALICE: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const BOB: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

    struct FixedLookups;

    #[async_trait]
    impl BalanceFetcher for FixedLookups {
        async fn fetch_balance(&self, _: &str, _: u64, _: &str) -> Result<u128> {
            Ok(1_250_000_000_000_000_000)
        }
    }

    #[async_trait]
    impl ProfileResolver for FixedLookups {
        async fn resolve_profile(&self, _: &str) -> Result<Profile> {
            Ok(Profile {
                name: Some("alice.eth".to_string()),
                avatar: Some("https://example.com/alice.png".to_string()),
            })
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .with_project_id("test-project")
            .with_chains(vec![1, 10, 137])
            .with_default_chain(1)
            .build()
    }

    fn wallet(address: &str, chain_id: u64) -> Arc<MemoryProvider> {
        Arc::new(
            MemoryProvider::new()
                .with_accounts(vec![address.to_string()])
                .with_chain_id(chain_id),
        )
    }

    fn builder(relay: Arc<MemoryProvider>, persisted: Arc<MemoryStore>) -> ModalClientBuilder {
        ModalClient::builder(config())
            .with_relay_factory(Arc::new(MemoryRelayFactory::new(relay)))
            .with_persistent_store(persisted)
            .with_balance_fetcher(Arc::new(FixedLookups))
            .with_profile_resolver(Arc::new(FixedLookups))
    }

    #[tokio::test]
    async fn test_missing_project_id() {
        let err = ModalClient::builder(ClientConfig::default())
            .with_relay_factory(Arc::new(MemoryRelayFactory::new(Arc::new(
                MemoryProvider::new(),
            ))))
            .build()
            .err()
            .unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("projectId is undefined"));
    }

    #[tokio::test]
    async fn test_missing_relay_factory() {
        let err = ModalClient::builder(config())
            .with_persistent_store(Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_build_outside_runtime() {
        let err = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let client = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        client.ready().await;

        let state = client.get_state();
        assert!(!state.is_connected);
        assert_eq!(state.selected_chain_id(), Some(1));
        let requested: Vec<_> = state
            .requested_networks
            .iter()
            .map(|network| network.id.to_string())
            .collect();
        assert_eq!(requested, vec!["eip155:1", "eip155:10", "eip155:137"]);
        assert_eq!(client.connectors().len(), 1);
    }

    #[tokio::test]
    async fn test_relay_restored_on_startup() {
        let relay = wallet(ALICE, 137);
        let persisted = Arc::new(MemoryStore::with_entry(
            WALLET_CHOICE_KEY,
            WALLET_CONNECT_CONNECTOR_ID,
        ));
        let client = builder(relay, persisted).build().unwrap();
        client.ready().await;

        let connection = client.connection();
        assert!(connection.is_connected);
        assert_eq!(connection.provider_kind, ProviderKind::Relay);
        assert_eq!(connection.chain_id, Some(137));
        assert_eq!(connection.address.as_deref(), Some(ALICE));
    }

    #[tokio::test]
    async fn test_relay_init_is_shared() {
        let factory = Arc::new(
            MemoryRelayFactory::new(wallet(ALICE, 1)).with_delay(Duration::from_millis(20)),
        );
        let client = ModalClient::builder(config())
            .with_relay_factory(factory.clone())
            .with_persistent_store(Arc::new(MemoryStore::new()))
            .with_balance_fetcher(Arc::new(FixedLookups))
            .with_profile_resolver(Arc::new(FixedLookups))
            .build()
            .unwrap();

        let (a, b) = futures::join!(client.relay_provider(), client.relay_provider());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        client.ready().await;

        assert_eq!(factory.init_count(), 1);
        let options = factory.last_options().unwrap();
        assert_eq!(options.project_id, "test-project");
        assert_eq!(options.chains, vec![0]);
        assert_eq!(options.optional_chains, vec![1, 10, 137]);
    }

    #[tokio::test]
    async fn test_connect_relay_forwards_uri_and_commits() {
        let relay = Arc::new(
            MemoryProvider::new()
                .with_accounts(vec![ALICE.to_string()])
                .with_chain_id(10)
                .with_display_uri("wc:abc@2?relay-protocol=irn"),
        );
        let persisted = Arc::new(MemoryStore::new());
        let client = builder(relay.clone(), persisted.clone()).build().unwrap();
        client.ready().await;

        let uris = Arc::new(StdMutex::new(Vec::new()));
        let sink = uris.clone();
        client
            .connect_relay(move |uri| sink.lock().unwrap().push(uri))
            .await
            .unwrap();

        assert_eq!(*uris.lock().unwrap(), vec!["wc:abc@2?relay-protocol=irn"]);
        assert_eq!(relay.listener_count(ProviderEventKind::DisplayUri), 0);
        assert_eq!(client.connection().provider_kind, ProviderKind::Relay);
        assert_eq!(
            persisted.get(WALLET_CHOICE_KEY).unwrap().as_deref(),
            Some(WALLET_CONNECT_CONNECTOR_ID)
        );

        let mut rx = client.subscribe_state();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| state.balance.is_some() && state.profile_name.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.balance.as_deref(), Some("1.25"));
        assert_eq!(state.balance_symbol.as_deref(), Some("ETH"));
        assert_eq!(state.profile_name.as_deref(), Some("alice.eth"));
        assert_eq!(state.selected_chain_id(), Some(10));
    }

    #[tokio::test]
    async fn test_connect_injected_and_disconnect() {
        let persisted = Arc::new(MemoryStore::new());
        let injected = wallet(BOB, 1);
        let client = builder(Arc::new(MemoryProvider::new()), persisted.clone())
            .with_injected(injected.clone())
            .build()
            .unwrap();
        client.ready().await;

        let connector = client
            .connectors()
            .into_iter()
            .find(|c| c.id == INJECTED_CONNECTOR_ID)
            .unwrap();
        client.connect_external(&connector).await.unwrap();

        assert_eq!(injected.request_methods(), vec![REQUEST_ACCOUNTS_METHOD.to_string()]);
        assert!(client.get_state().is_connected);
        assert_eq!(
            persisted.get(WALLET_CHOICE_KEY).unwrap().as_deref(),
            Some(INJECTED_CONNECTOR_ID)
        );

        client.disconnect().await.unwrap();
        let connection = client.connection();
        assert!(!connection.is_connected);
        assert_eq!(connection.provider_kind, ProviderKind::None);
        assert_eq!(persisted.get(WALLET_CHOICE_KEY).unwrap(), None);

        let state = client.get_state();
        assert!(!state.is_connected);
        assert_eq!(state.caip_address, None);
        assert_eq!(state.selected_chain_id(), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_request_accounts_propagates() {
        let injected = wallet(BOB, 1);
        injected.respond_to(REQUEST_ACCOUNTS_METHOD, |_| Err(ProviderError::user_rejected()));
        let client = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .with_injected(injected)
            .build()
            .unwrap();
        client.ready().await;

        let err = client.connect_external(&Connector::injected()).await.unwrap_err();
        assert!(matches!(err, Error::Provider { code: 4001, .. }));
        assert!(!client.connection().is_connected);
    }

    #[tokio::test]
    async fn test_missing_adapters() {
        let client = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        let err = client.connect_external(&Connector::vendor()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectorNotFound(_)));

        let err = client
            .connect_external(&Connector::wallet_connect())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_relay_pairing_approved_after_connect_commits() {
        let relay = Arc::new(MemoryProvider::new().with_chain_id(1));
        let persisted = Arc::new(MemoryStore::new());
        let client = builder(relay.clone(), persisted.clone()).build().unwrap();
        client.ready().await;

        client.connect_relay(|_| {}).await.unwrap();
        assert!(!client.connection().is_connected);

        let mut rx = client.subscribe_state();
        relay.set_accounts(vec![ALICE.to_string()]);
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| state.is_connected))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(client.connection().provider_kind, ProviderKind::Relay);
        assert_eq!(client.connection().address.as_deref(), Some(ALICE));
        assert_eq!(
            persisted.get(WALLET_CHOICE_KEY).unwrap().as_deref(),
            Some(WALLET_CONNECT_CONNECTOR_ID)
        );
    }

    #[tokio::test]
    async fn test_relay_disconnect_ends_session() {
        let relay = wallet(ALICE, 1);
        let persisted = Arc::new(MemoryStore::with_entry(
            WALLET_CHOICE_KEY,
            WALLET_CONNECT_CONNECTOR_ID,
        ));
        let client = builder(relay.clone(), persisted.clone()).build().unwrap();
        client.ready().await;
        assert!(client.connection().is_connected);

        client.disconnect().await.unwrap();
        assert!(relay.current_accounts().is_empty());
        assert!(!client.connection().is_connected);
        assert_eq!(persisted.get(WALLET_CHOICE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_discovery_connectors_and_restoration() {
        let channel = Arc::new(LocalDiscoveryChannel::new());
        let rabby = wallet(ALICE, 42161);
        channel.register(AnnounceEvent::new(
            ProviderInfo::new("Rabby Wallet", "data:image/svg+xml;base64,AA", "io.rabby"),
            rabby.clone(),
        ));

        let persisted = Arc::new(MemoryStore::with_entry(WALLET_CHOICE_KEY, "Rabby Wallet"));
        let client = builder(Arc::new(MemoryProvider::new()), persisted)
            .with_discovery(channel.clone())
            .build()
            .unwrap();
        client.ready().await;

        let connectors = client.connectors();
        assert_eq!(connectors.len(), 2);
        assert_eq!(connectors[1].id, DISCOVERY_CONNECTOR_ID);
        assert_eq!(connectors[1].name, "Rabby Wallet");

        let connection = client.connection();
        assert_eq!(connection.provider_kind, ProviderKind::Discovery);
        assert_eq!(connection.chain_id, Some(42161));

        // The window is sealed: later announcements add nothing
        channel.announce(&AnnounceEvent::new(
            ProviderInfo::new("Late Wallet", "", "com.late"),
            Arc::new(MemoryProvider::new()),
        ));
        assert_eq!(client.connectors().len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_disabled() {
        let channel = Arc::new(LocalDiscoveryChannel::new());
        channel.register(AnnounceEvent::new(
            ProviderInfo::new("MetaMask", "", "io.metamask"),
            Arc::new(MemoryProvider::new()),
        ));

        let mut config = config();
        config.connectors.enable_discovery = false;
        let client = ModalClient::builder(config)
            .with_relay_factory(Arc::new(MemoryRelayFactory::new(Arc::new(
                MemoryProvider::new(),
            ))))
            .with_persistent_store(Arc::new(MemoryStore::new()))
            .with_discovery(channel)
            .build()
            .unwrap();

        assert_eq!(client.connectors().len(), 1);
    }

    #[tokio::test]
    async fn test_vendor_restoration() {
        let vendor = wallet(BOB, 8453);
        let persisted = Arc::new(MemoryStore::with_entry(WALLET_CHOICE_KEY, VENDOR_CONNECTOR_ID));
        let client = builder(Arc::new(MemoryProvider::new()), persisted)
            .with_vendor(vendor)
            .build()
            .unwrap();
        client.ready().await;

        let connection = client.connection();
        assert_eq!(connection.provider_kind, ProviderKind::Vendor);
        assert_eq!(connection.chain_id, Some(8453));
    }

    #[tokio::test]
    async fn test_vendor_without_cached_accounts_clears_choice() {
        let vendor = Arc::new(MemoryProvider::new().with_chain_id(1));
        let persisted = Arc::new(MemoryStore::with_entry(WALLET_CHOICE_KEY, VENDOR_CONNECTOR_ID));
        let client = builder(Arc::new(MemoryProvider::new()), persisted.clone())
            .with_vendor(vendor)
            .build()
            .unwrap();
        client.ready().await;

        assert!(!client.connection().is_connected);
        assert_eq!(persisted.get(WALLET_CHOICE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_restoration() {
        let persisted = Arc::new(MemoryStore::with_entry(WALLET_CHOICE_KEY, INJECTED_CONNECTOR_ID));
        let client = builder(Arc::new(MemoryProvider::new()), persisted)
            .with_injected(wallet(ALICE, 1))
            .build()
            .unwrap();
        client.ready().await;

        assert_eq!(client.connection().provider_kind, ProviderKind::Injected);
    }

    #[tokio::test]
    async fn test_approved_networks() {
        let relay = Arc::new(
            MemoryProvider::new()
                .with_accounts(vec![ALICE.to_string()])
                .with_chain_id(1)
                .with_session(SessionNamespace {
                    chains: vec!["eip155:1".to_string(), "eip155:137".to_string()],
                    methods: vec!["eth_sendTransaction".to_string(), ADD_CHAIN_METHOD.to_string()],
                    events: vec!["chainChanged".to_string()],
                    accounts: vec![format!("eip155:1:{}", ALICE)],
                }),
        );
        let persisted = Arc::new(MemoryStore::with_entry(
            WALLET_CHOICE_KEY,
            WALLET_CONNECT_CONNECTOR_ID,
        ));
        let client = builder(relay, persisted).build().unwrap();
        client.ready().await;

        let approved = client.approved_networks().await.unwrap();
        assert!(approved.supports_all_networks);
        assert_eq!(
            approved.approved_caip_network_ids,
            Some(vec![CaipNetworkId::eip155(1), CaipNetworkId::eip155(137)])
        );
    }

    #[tokio::test]
    async fn test_approved_networks_without_relay() {
        let client = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();

        let approved = client.approved_networks().await.unwrap();
        assert_eq!(approved.approved_caip_network_ids, None);
        assert!(approved.supports_all_networks);
    }

    #[tokio::test]
    async fn test_check_installed() {
        let without = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        assert!(!without.check_installed(None));
        assert!(!without.check_installed(Some(&["isMetaMask"])));

        let with = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .with_injected(Arc::new(MemoryProvider::new().with_flag("isMetaMask")))
            .build()
            .unwrap();
        assert!(with.check_installed(None));
        assert!(with.check_installed(Some(&["isBraveWallet", "isMetaMask"])));
        assert!(!with.check_installed(Some(&["isBraveWallet"])));
    }

    #[tokio::test]
    async fn test_switch_caip_network() {
        let persisted = Arc::new(MemoryStore::with_entry(WALLET_CHOICE_KEY, INJECTED_CONNECTOR_ID));
        let injected = Arc::new(
            MemoryProvider::new()
                .with_accounts(vec![ALICE.to_string()])
                .with_chain_id(1)
                .with_known_chains(&[10]),
        );
        let client = builder(Arc::new(MemoryProvider::new()), persisted)
            .with_injected(injected)
            .build()
            .unwrap();
        client.ready().await;

        let outcome = client
            .switch_caip_network(&CaipNetworkId::eip155(10))
            .await
            .unwrap();
        assert_eq!(outcome, Some(SwitchOutcome::Switched));
        assert_eq!(client.get_state().selected_chain_id(), Some(10));

        let solana: CaipNetworkId = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp".parse().unwrap();
        assert_eq!(client.switch_caip_network(&solana).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_switch_without_connection() {
        let client = builder(Arc::new(MemoryProvider::new()), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        client.ready().await;

        let err = client.switch_network(10).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }
}
