//! In-process wallet provider
//!
//! [`MemoryProvider`] behaves like a small EVM wallet living in the same
//! process: it owns an account list and an active chain, answers the
//! standard account and chain requests, knows which chains it can switch to
//! and emits the usual events when its state changes. It implements every
//! provider trait, so one instance can stand in for a relay session, an
//! injected extension, a discovery-announced wallet or a vendor SDK.
//!
//! Hosts use it to drive the client without a real wallet; it is also what
//! the crate's own tests run against.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use connectkit_core::types::{
    chain_id_from_value, chain_id_to_hex, ADD_CHAIN_METHOD, REQUEST_ACCOUNTS_METHOD,
    SWITCH_CHAIN_METHOD,
};

use crate::events::{Listeners, Subscription};
use crate::provider::{
    EventHandler, ProviderError, ProviderEvent, ProviderEventKind, ProviderResult,
    RelayProvider, RelayProviderFactory, RelayProviderOptions, RequestArguments,
    SessionNamespace, VendorProvider, WalletProvider, UNRECOGNIZED_CHAIN_ERROR_CODE,
    UNSUPPORTED_METHOD_ERROR_CODE,
};

/// Scripted answer to one request method
pub type Responder = Arc<dyn Fn(&RequestArguments) -> ProviderResult<Value> + Send + Sync>;

#[derive(Default)]
struct WalletState {
    accounts: Vec<String>,
    chain_id: Option<u64>,
    known_chains: HashSet<u64>,
    flags: HashSet<String>,
    session: Option<SessionNamespace>,
    display_uri: Option<String>,
    signer_error: Option<ProviderError>,
}

/// In-memory wallet provider
pub struct MemoryProvider {
    state: Mutex<WalletState>,
    responders: Mutex<HashMap<String, Responder>>,
    requests: Mutex<Vec<RequestArguments>>,
    listeners: Listeners<ProviderEventKind, EventHandler>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryProvider {
    /// Create a wallet without accounts
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WalletState::default()),
            responders: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            listeners: Listeners::new(),
        }
    }

    /// Set the account list
    pub fn with_accounts(self, accounts: Vec<String>) -> Self {
        lock(&self.state).accounts = accounts;
        self
    }

    /// Set the active chain; the chain becomes known to the wallet
    pub fn with_chain_id(self, chain_id: u64) -> Self {
        {
            let mut state = lock(&self.state);
            state.chain_id = Some(chain_id);
            state.known_chains.insert(chain_id);
        }
        self
    }

    /// Chains the wallet can switch to without registering them first
    pub fn with_known_chains(self, chains: &[u64]) -> Self {
        lock(&self.state).known_chains.extend(chains.iter().copied());
        self
    }

    /// Add an identification flag such as `isMetaMask`
    pub fn with_flag(self, flag: impl Into<String>) -> Self {
        lock(&self.state).flags.insert(flag.into());
        self
    }

    /// Set the relay session namespace
    pub fn with_session(self, session: SessionNamespace) -> Self {
        lock(&self.state).session = Some(session);
        self
    }

    /// Pairing URI emitted when a relay connection starts
    pub fn with_display_uri(self, uri: impl Into<String>) -> Self {
        lock(&self.state).display_uri = Some(uri.into());
        self
    }

    /// Answer `method` with `responder` instead of the built-in behavior
    pub fn respond_to(
        &self,
        method: impl Into<String>,
        responder: impl Fn(&RequestArguments) -> ProviderResult<Value> + Send + Sync + 'static,
    ) {
        lock(&self.responders).insert(method.into(), Arc::new(responder));
    }

    /// Make signer reads fail with `error`, or succeed again with `None`
    pub fn fail_signer(&self, error: Option<ProviderError>) {
        lock(&self.state).signer_error = error;
    }

    /// Replace the accounts and emit `accountsChanged`
    pub fn set_accounts(&self, accounts: Vec<String>) {
        lock(&self.state).accounts = accounts.clone();
        self.emit(&ProviderEvent::AccountsChanged(accounts));
    }

    /// Switch to `chain_id` and emit `chainChanged`
    pub fn set_chain_id(&self, chain_id: u64) {
        {
            let mut state = lock(&self.state);
            state.chain_id = Some(chain_id);
            state.known_chains.insert(chain_id);
        }
        self.emit(&ProviderEvent::ChainChanged(json!(chain_id_to_hex(chain_id))));
    }

    /// Notify listeners of `event`
    pub fn emit(&self, event: &ProviderEvent) {
        let kind = event.kind();
        for handler in self.listeners.matching(|registered| *registered == kind) {
            handler(event);
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RequestArguments> {
        lock(&self.requests).clone()
    }

    /// Methods of the requests received so far
    pub fn request_methods(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|args| args.method.clone())
            .collect()
    }

    /// Number of registered listeners of `kind`
    pub fn listener_count(&self, kind: ProviderEventKind) -> usize {
        self.listeners.matching(|registered| *registered == kind).len()
    }

    /// Current account list
    pub fn current_accounts(&self) -> Vec<String> {
        lock(&self.state).accounts.clone()
    }

    fn switch_chain(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let target = args
            .params
            .get(0)
            .and_then(|param| param.get("chainId"))
            .and_then(chain_id_from_value)
            .ok_or_else(|| ProviderError::new(-32602, "Invalid chainId parameter"))?;

        if !lock(&self.state).known_chains.contains(&target) {
            return Err(ProviderError::new(
                UNRECOGNIZED_CHAIN_ERROR_CODE,
                format!("Unrecognized chain ID \"{}\"", chain_id_to_hex(target)),
            ));
        }

        self.set_chain_id(target);
        Ok(Value::Null)
    }

    fn add_chain(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let chain = args
            .params
            .get(0)
            .and_then(|param| param.get("chainId"))
            .and_then(chain_id_from_value)
            .ok_or_else(|| ProviderError::new(-32602, "Invalid chainId parameter"))?;

        lock(&self.state).known_chains.insert(chain);
        self.set_chain_id(chain);
        Ok(Value::Null)
    }

    fn answer(&self, args: &RequestArguments) -> ProviderResult<Value> {
        let responder = lock(&self.responders).get(&args.method).cloned();
        if let Some(responder) = responder {
            return responder(args);
        }

        match args.method.as_str() {
            "eth_accounts" | REQUEST_ACCOUNTS_METHOD => Ok(json!(lock(&self.state).accounts)),
            "eth_chainId" => match lock(&self.state).chain_id {
                Some(chain_id) => Ok(json!(chain_id_to_hex(chain_id))),
                None => Ok(Value::Null),
            },
            SWITCH_CHAIN_METHOD => self.switch_chain(args),
            ADD_CHAIN_METHOD => self.add_chain(args),
            other => Err(ProviderError::new(
                UNSUPPORTED_METHOD_ERROR_CODE,
                format!("Method {} is not supported", other),
            )),
        }
    }

    fn signer_error(&self) -> Option<ProviderError> {
        lock(&self.state).signer_error.clone()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for MemoryProvider {
    async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        debug!("Memory wallet received {}", args.method);
        lock(&self.requests).push(args.clone());
        self.answer(&args)
    }

    fn on(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription {
        self.listeners.add(kind, handler)
    }

    async fn get_address(&self) -> ProviderResult<Option<String>> {
        if let Some(error) = self.signer_error() {
            return Err(error);
        }
        Ok(lock(&self.state).accounts.first().cloned())
    }

    async fn get_chain_id(&self) -> ProviderResult<Option<u64>> {
        if let Some(error) = self.signer_error() {
            return Err(error);
        }
        Ok(lock(&self.state).chain_id)
    }

    fn has_flag(&self, flag: &str) -> bool {
        lock(&self.state).flags.contains(flag)
    }
}

#[async_trait]
impl RelayProvider for MemoryProvider {
    async fn connect(&self) -> ProviderResult<()> {
        let uri = lock(&self.state).display_uri.clone();
        if let Some(uri) = uri {
            self.emit(&ProviderEvent::DisplayUri(uri));
        }
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        {
            let mut state = lock(&self.state);
            state.accounts.clear();
            state.session = None;
        }
        self.emit(&ProviderEvent::Disconnect);
        Ok(())
    }

    fn chain_id(&self) -> Option<u64> {
        lock(&self.state).chain_id
    }

    fn accounts(&self) -> Vec<String> {
        lock(&self.state).accounts.clone()
    }

    fn session_namespace(&self, namespace: &str) -> Option<SessionNamespace> {
        if namespace != "eip155" {
            return None;
        }
        lock(&self.state).session.clone()
    }
}

impl VendorProvider for MemoryProvider {
    fn cached_accounts(&self) -> Vec<String> {
        lock(&self.state).accounts.clone()
    }
}

/// Relay factory handing out one shared [`MemoryProvider`]
pub struct MemoryRelayFactory {
    provider: Arc<MemoryProvider>,
    delay: Duration,
    init_count: AtomicUsize,
    last_options: Mutex<Option<RelayProviderOptions>>,
}

impl MemoryRelayFactory {
    /// Factory resolving immediately
    pub fn new(provider: Arc<MemoryProvider>) -> Self {
        Self {
            provider,
            delay: Duration::ZERO,
            init_count: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    /// Delay every initialization
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of initializations performed
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    /// Options of the last initialization
    pub fn last_options(&self) -> Option<RelayProviderOptions> {
        lock(&self.last_options).clone()
    }
}

#[async_trait]
impl RelayProviderFactory for MemoryRelayFactory {
    async fn init(&self, options: RelayProviderOptions) -> ProviderResult<Arc<dyn RelayProvider>> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *lock(&self.last_options) = Some(options);
        Ok(self.provider.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_to_unknown_chain() {
        let wallet = MemoryProvider::new().with_chain_id(1);
        let err = wallet
            .request(RequestArguments::new(
                SWITCH_CHAIN_METHOD,
                json!([{"chainId": "0x89"}]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, UNRECOGNIZED_CHAIN_ERROR_CODE);

        wallet
            .request(RequestArguments::new(
                ADD_CHAIN_METHOD,
                json!([{"chainId": "0x89", "chainName": "Polygon"}]),
            ))
            .await
            .unwrap();
        assert_eq!(RelayProvider::chain_id(&wallet), Some(137));

        wallet
            .request(RequestArguments::new(
                SWITCH_CHAIN_METHOD,
                json!([{"chainId": "0x1"}]),
            ))
            .await
            .unwrap();
        assert_eq!(RelayProvider::chain_id(&wallet), Some(1));
    }

    #[tokio::test]
    async fn test_responder_overrides_builtin() {
        let wallet = MemoryProvider::new();
        wallet.respond_to("eth_chainId", |_| Ok(json!("0xa")));

        assert_eq!(wallet.get_chain_id().await.unwrap(), None);
        let raw = wallet
            .request(RequestArguments::without_params("eth_chainId"))
            .await
            .unwrap();
        assert_eq!(raw, json!("0xa"));
        assert_eq!(wallet.request_methods(), vec!["eth_chainId".to_string()]);
    }

    #[test]
    fn test_events_reach_listeners_until_dropped() {
        let wallet = MemoryProvider::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let sub = wallet.on(
            ProviderEventKind::ChainChanged,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        wallet.set_chain_id(10);
        wallet.set_accounts(vec![]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        drop(sub);
        wallet.set_chain_id(1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(wallet.listener_count(ProviderEventKind::ChainChanged), 0);
    }

    #[tokio::test]
    async fn test_signer_failure() {
        let wallet = MemoryProvider::new().with_chain_id(1);
        wallet.fail_signer(Some(ProviderError::new(-32000, "locked")));
        assert!(wallet.get_address().await.is_err());
        assert!(wallet.get_chain_id().await.is_err());

        wallet.fail_signer(None);
        assert_eq!(wallet.get_chain_id().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_relay_factory_records_options() {
        let wallet = Arc::new(MemoryProvider::new());
        let factory = MemoryRelayFactory::new(wallet);

        let options = RelayProviderOptions::new("pid", vec![1], "test");
        factory.init(options.clone()).await.unwrap();

        assert_eq!(factory.init_count(), 1);
        assert_eq!(factory.last_options(), Some(options));
    }
}
