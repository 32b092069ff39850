//! Provider sync engine
//!
//! The engine is the only writer of the [`ConnectionStore`]. It turns
//! provider activations and provider events into connection state, and it
//! derives the public session (CAIP account, selected network, balance,
//! profile) from that state whenever the account, chain or connected flag
//! changes.
//!
//! # Event binding
//!
//! Only the active provider's events are listened to. Activating a provider
//! drops the subscriptions held for the previous one, and a disconnect drops
//! them all, so a replaced provider can never write into the store.
//!
//! # Staleness
//!
//! Balance and profile lookups run in the background. Each lookup carries
//! the store epoch it was started for and is discarded if the store moved on
//! before it completed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use connectkit_core::rpc::format_ether;
use connectkit_core::types::{chain_id_from_value, Token};
use connectkit_core::{
    BalanceFetcher, CaipAddress, CaipNetwork, ChainRegistry, PersistentStore, ProfileResolver,
    ProviderKind, WALLET_CHOICE_KEY,
};

use crate::events::Subscription;
use crate::provider::{ProviderEvent, ProviderEventKind, ProviderHandle, RelayProvider};
use crate::session::{PublicState, SessionState};
use crate::store::{ConnectionKey, ConnectionState, ConnectionStore};

/// Collaborators of the engine
pub struct EngineContext {
    /// Connection state written by the engine
    pub store: Arc<ConnectionStore>,
    /// Public state derived by the engine
    pub session: Arc<SessionState>,
    /// Persisted wallet choice
    pub persisted: Arc<dyn PersistentStore>,
    /// Chain metadata
    pub chains: Arc<ChainRegistry>,
    /// Balance lookups
    pub balances: Arc<dyn BalanceFetcher>,
    /// Profile lookups
    pub profiles: Arc<dyn ProfileResolver>,
    /// Per-chain token shown in place of the native currency
    pub tokens: HashMap<u64, Token>,
    /// Network selected while nothing is connected
    pub default_network: Option<CaipNetwork>,
}

/// Provider sync engine
pub struct SyncEngine {
    store: Arc<ConnectionStore>,
    session: Arc<SessionState>,
    persisted: Arc<dyn PersistentStore>,
    chains: Arc<ChainRegistry>,
    balances: Arc<dyn BalanceFetcher>,
    profiles: Arc<dyn ProfileResolver>,
    tokens: HashMap<u64, Token>,
    default_network: Option<CaipNetwork>,
    provider_subscriptions: Mutex<Vec<Subscription>>,
    binding: AtomicU64,
    store_subscription: Mutex<Option<Subscription>>,
    relay_watch: Mutex<Option<Subscription>>,
    has_synced_connected_account: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `future` on the current runtime, if there is one
fn spawn_detached<F>(future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => Some(runtime.spawn(future)),
        Err(_) => {
            warn!("No async runtime available, skipping background task");
            None
        }
    }
}

impl SyncEngine {
    /// Create the engine and start reacting to connection changes
    pub fn new(context: EngineContext) -> Arc<Self> {
        let engine = Arc::new(Self {
            store: context.store,
            session: context.session,
            persisted: context.persisted,
            chains: context.chains,
            balances: context.balances,
            profiles: context.profiles,
            tokens: context.tokens,
            default_network: context.default_network,
            provider_subscriptions: Mutex::new(Vec::new()),
            binding: AtomicU64::new(0),
            store_subscription: Mutex::new(None),
            relay_watch: Mutex::new(None),
            has_synced_connected_account: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&engine);
        let subscription = engine.store.subscribe_keys(
            &[
                ConnectionKey::Address,
                ConnectionKey::ChainId,
                ConnectionKey::IsConnected,
            ],
            move |_: &ConnectionState| {
                if let Some(engine) = weak.upgrade() {
                    engine.react_to_state_change();
                }
            },
        );
        *lock(&engine.store_subscription) = Some(subscription);

        engine
    }

    /// Connection store written by this engine
    pub fn store(&self) -> &Arc<ConnectionStore> {
        &self.store
    }

    /// Public session state
    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Make `handle` the active provider
    ///
    /// Reads the account and chain from the provider's signer. Only when both
    /// are available is the session committed, the wallet choice persisted
    /// and the provider's events bound. Returns whether the provider became
    /// active; failures are logged and leave the state untouched.
    #[instrument(skip(self, handle), fields(kind = %handle.kind()))]
    pub async fn activate(self: &Arc<Self>, handle: ProviderHandle) -> bool {
        let (address, chain_id) =
            match futures::try_join!(handle.get_address(), handle.get_chain_id()) {
                Ok((Some(address), Some(chain_id))) if !address.is_empty() => (address, chain_id),
                Ok(_) => {
                    debug!("Provider has no active account or chain");
                    return false;
                }
                Err(err) => {
                    warn!("Failed to read provider signer: {}", err);
                    return false;
                }
            };

        self.persist_wallet_choice(&handle.wallet_choice());
        info!("Activated {} provider on chain {}", handle.kind(), chain_id);

        self.store.commit(handle.clone(), chain_id, address);
        self.bind_provider_events(&handle);
        true
    }

    /// Activate the relay once a pairing approved after `connect` delivers accounts
    ///
    /// Only acts while the relay is not the active provider; once it is, the
    /// bound provider events take over.
    pub fn watch_relay(self: &Arc<Self>, relay: &Arc<dyn RelayProvider>) {
        let weak_engine = Arc::downgrade(self);
        let weak_relay = Arc::downgrade(relay);
        let subscription = relay.on(
            ProviderEventKind::AccountsChanged,
            Arc::new(move |event: &ProviderEvent| {
                let ProviderEvent::AccountsChanged(accounts) = event else {
                    return;
                };
                let (Some(engine), Some(relay)) = (weak_engine.upgrade(), weak_relay.upgrade())
                else {
                    return;
                };
                if accounts.is_empty() || engine.store.provider_kind() == ProviderKind::Relay {
                    return;
                }
                debug!("Relay pairing delivered an account");
                let handle = ProviderHandle::Relay(relay);
                spawn_detached(async move {
                    engine.activate(handle).await;
                });
            }),
        );
        *lock(&self.relay_watch) = Some(subscription);
    }

    /// Apply an `accountsChanged` event
    pub fn on_accounts_changed(&self, accounts: &[String]) {
        match accounts.first() {
            Some(address) => self.store.set_address(Some(address.clone())),
            None => self.on_disconnect(),
        }
    }

    /// Apply a `chainChanged` event; the chain may be hex or decimal
    pub fn on_chain_changed(&self, raw: &Value) {
        match chain_id_from_value(raw) {
            Some(chain_id) => self.store.set_chain_id(Some(chain_id)),
            None => warn!("Ignoring malformed chain id {}", raw),
        }
    }

    /// Apply a `disconnect` event or a user-initiated disconnect
    pub fn on_disconnect(&self) {
        if let Err(err) = self.persisted.remove(WALLET_CHOICE_KEY) {
            warn!("Failed to clear the wallet choice: {}", err);
        }
        self.unbind_provider_events();
        self.store.reset();
    }

    pub(crate) fn set_chain_id(&self, chain_id: u64) {
        self.store.set_chain_id(Some(chain_id));
    }

    /// Derive the public session from the connection state
    ///
    /// Idempotent. When an account is connected the returned task refreshes
    /// its balance and profile.
    pub fn react_to_state_change(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let state = self.store.snapshot();

        match (state.is_connected, state.address.as_deref(), state.chain_id) {
            (true, Some(address), Some(chain_id)) => {
                self.sync_account(address, chain_id);
                self.has_synced_connected_account
                    .store(true, Ordering::SeqCst);

                let engine = Arc::clone(self);
                let epoch = state.epoch;
                let address = address.to_string();
                spawn_detached(async move {
                    engine.refresh_session(epoch, &address, chain_id).await;
                })
            }
            _ => {
                if let Some(chain_id) = state.chain_id {
                    self.session
                        .set_selected_network(Some(self.chains.network(chain_id)));
                }
                if !state.is_connected && self.has_synced_connected_account.load(Ordering::SeqCst)
                {
                    self.session.reset_account(self.default_network.clone());
                }
                None
            }
        }
    }

    fn sync_account(&self, address: &str, chain_id: u64) {
        let caip = CaipAddress::eip155(chain_id, address);
        let network = self.chains.network(chain_id);
        let explorer_url = self.chains.address_explorer_url(chain_id, address);
        let token = self.tokens.get(&chain_id).cloned();

        self.session.update(|state| {
            let same_account = state.caip_address.as_ref() == Some(&caip);
            let same_address = state
                .caip_address
                .as_ref()
                .is_some_and(|previous| previous.address == caip.address);

            if !same_account {
                state.balance = None;
                state.balance_symbol = None;
            }
            if !same_address {
                state.profile_name = None;
                state.profile_image = None;
            }

            state.caip_address = Some(caip);
            state.is_connected = true;
            state.selected_network = Some(network);
            state.address_explorer_url = explorer_url;
            state.token = token;
        });
    }

    /// Refresh balance and profile concurrently
    pub async fn refresh_session(&self, epoch: u64, address: &str, chain_id: u64) {
        futures::join!(
            self.refresh_balance(epoch, address, chain_id),
            self.refresh_profile(epoch, address),
        );
    }

    /// Fetch the native balance
    ///
    /// Chains missing an RPC endpoint, a name or a currency are skipped.
    #[instrument(skip(self))]
    pub async fn refresh_balance(&self, epoch: u64, address: &str, chain_id: u64) {
        let (Some(rpc_url), Some(_), Some(symbol)) = (
            self.chains.rpc_url(chain_id),
            self.chains.name(chain_id),
            self.chains.currency(chain_id),
        ) else {
            debug!("Chain {} is not described well enough for a balance", chain_id);
            return;
        };

        match self.balances.fetch_balance(rpc_url, chain_id, address).await {
            Ok(wei) => {
                let written = self.write_if_current(epoch, address, |state| {
                    state.balance = Some(format_ether(wei));
                    state.balance_symbol = Some(symbol.to_string());
                });
                if !written {
                    debug!("Discarding stale balance");
                }
            }
            Err(err) => warn!("Balance lookup failed: {}", err),
        }
    }

    /// Resolve the profile name and avatar
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self, epoch: u64, address: &str) {
        match self.profiles.resolve_profile(address).await {
            Ok(profile) => {
                let written = self.write_if_current(epoch, address, |state| {
                    state.profile_name = profile.name;
                    state.profile_image = profile.avatar;
                });
                if !written {
                    debug!("Discarding stale profile");
                }
            }
            Err(err) => warn!("Profile lookup failed: {}", err),
        }
    }

    /// Apply `f` only while the store is still at `epoch` for `address`
    ///
    /// The check runs under the session lock, so a commit landing meanwhile
    /// re-derives the account after this write.
    fn write_if_current(
        &self,
        epoch: u64,
        address: &str,
        f: impl FnOnce(&mut PublicState),
    ) -> bool {
        let mut current = false;
        self.session.update(|state| {
            let snapshot = self.store.snapshot();
            current = snapshot.epoch == epoch && snapshot.address.as_deref() == Some(address);
            if current {
                f(state);
            }
        });
        current
    }

    fn persist_wallet_choice(&self, choice: &str) {
        if let Err(err) = self.persisted.set(WALLET_CHOICE_KEY, choice) {
            warn!("Failed to persist the wallet choice: {}", err);
        }
    }

    fn bind_provider_events(self: &Arc<Self>, handle: &ProviderHandle) {
        let generation = self.binding.fetch_add(1, Ordering::SeqCst) + 1;

        let subscriptions = [
            ProviderEventKind::AccountsChanged,
            ProviderEventKind::ChainChanged,
            ProviderEventKind::Disconnect,
        ]
        .into_iter()
        .map(|kind| {
            let weak = Arc::downgrade(self);
            handle.on(
                kind,
                Arc::new(move |event: &ProviderEvent| {
                    if let Some(engine) = weak.upgrade() {
                        engine.handle_provider_event(generation, event);
                    }
                }),
            )
        })
        .collect();

        // Replacing the list drops the previous provider's listeners
        *lock(&self.provider_subscriptions) = subscriptions;
    }

    fn unbind_provider_events(&self) {
        self.binding.fetch_add(1, Ordering::SeqCst);
        let subscriptions = std::mem::take(&mut *lock(&self.provider_subscriptions));
        drop(subscriptions);
    }

    fn handle_provider_event(self: &Arc<Self>, generation: u64, event: &ProviderEvent) {
        if self.binding.load(Ordering::SeqCst) != generation {
            debug!("Ignoring event from a replaced provider");
            return;
        }

        match event {
            ProviderEvent::AccountsChanged(accounts)
                if !accounts.is_empty() && self.store.provider_kind() == ProviderKind::Relay =>
            {
                // A relay account change means a new session: commit it again
                if let Some(handle) = self.store.provider() {
                    let engine = Arc::clone(self);
                    spawn_detached(async move {
                        engine.activate(handle).await;
                    });
                }
            }
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts),
            ProviderEvent::ChainChanged(raw) => self.on_chain_changed(raw),
            ProviderEvent::Disconnect => self.on_disconnect(),
            ProviderEvent::DisplayUri(_) => {}
        }
    }
}
