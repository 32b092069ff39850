//! Shared connection state
//!
//! [`ConnectionStore`] holds the active provider, its kind, the active chain
//! and account, and whether a session is established. Only the sync engine
//! writes to it. Every write that changes something bumps the epoch and
//! then notifies the listeners of the changed keys, synchronously and in
//! registration order, after the store lock has been released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use connectkit_core::ProviderKind;
use tracing::trace;

use crate::events::{Listeners, Subscription};
use crate::provider::ProviderHandle;

/// Snapshot of the connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    /// Active provider
    pub provider: Option<ProviderHandle>,
    /// Kind of the active provider
    pub provider_kind: ProviderKind,
    /// Active chain
    pub chain_id: Option<u64>,
    /// Active account
    pub address: Option<String>,
    /// Whether a session is established
    pub is_connected: bool,
    /// Incremented on every effective write
    pub epoch: u64,
}

/// Field of the connection state a listener can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    /// The provider handle
    Provider,
    /// The provider kind
    ProviderKind,
    /// The active chain
    ChainId,
    /// The active account
    Address,
    /// The connected flag
    IsConnected,
}

/// Connection state listener
pub type StateListener = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

/// Single-writer store of the connection state
pub struct ConnectionStore {
    state: Mutex<ConnectionState>,
    listeners: Listeners<Vec<ConnectionKey>, StateListener>,
}

fn same_provider(a: &Option<ProviderHandle>, b: &Option<ProviderHandle>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(ProviderHandle::Relay(a)), Some(ProviderHandle::Relay(b))) => Arc::ptr_eq(a, b),
        (Some(ProviderHandle::Injected(a)), Some(ProviderHandle::Injected(b))) => {
            Arc::ptr_eq(a, b)
        }
        (
            Some(ProviderHandle::Discovery { name: a, provider: pa }),
            Some(ProviderHandle::Discovery { name: b, provider: pb }),
        ) => a == b && Arc::ptr_eq(pa, pb),
        (Some(ProviderHandle::Vendor(a)), Some(ProviderHandle::Vendor(b))) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

fn changed_keys(before: &ConnectionState, after: &ConnectionState) -> Vec<ConnectionKey> {
    let mut keys = Vec::new();
    if !same_provider(&before.provider, &after.provider) {
        keys.push(ConnectionKey::Provider);
    }
    if before.provider_kind != after.provider_kind {
        keys.push(ConnectionKey::ProviderKind);
    }
    if before.chain_id != after.chain_id {
        keys.push(ConnectionKey::ChainId);
    }
    if before.address != after.address {
        keys.push(ConnectionKey::Address);
    }
    if before.is_connected != after.is_connected {
        keys.push(ConnectionKey::IsConnected);
    }
    keys
}

impl ConnectionStore {
    /// Create a disconnected store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::default()),
            listeners: Listeners::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ConnectionState {
        self.lock().clone()
    }

    /// Active provider
    pub fn provider(&self) -> Option<ProviderHandle> {
        self.lock().provider.clone()
    }

    /// Kind of the active provider
    pub fn provider_kind(&self) -> ProviderKind {
        self.lock().provider_kind
    }

    /// Active chain
    pub fn chain_id(&self) -> Option<u64> {
        self.lock().chain_id
    }

    /// Active account
    pub fn address(&self) -> Option<String> {
        self.lock().address.clone()
    }

    /// Whether a session is established
    pub fn is_connected(&self) -> bool {
        self.lock().is_connected
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Watch one field
    pub fn subscribe_key(
        &self,
        key: ConnectionKey,
        listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_keys(&[key], listener)
    }

    /// Watch several fields; the listener runs once per write touching any of them
    pub fn subscribe_keys(
        &self,
        keys: &[ConnectionKey],
        listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(keys.to_vec(), Arc::new(listener))
    }

    pub(crate) fn set_chain_id(&self, chain_id: Option<u64>) {
        self.update(|state| state.chain_id = chain_id);
    }

    pub(crate) fn set_address(&self, address: Option<String>) {
        self.update(|state| state.address = address);
    }

    /// Install a connected session in one write
    pub(crate) fn commit(&self, provider: ProviderHandle, chain_id: u64, address: String) {
        self.update(|state| {
            state.provider_kind = provider.kind();
            state.provider = Some(provider);
            state.chain_id = Some(chain_id);
            state.address = Some(address);
            state.is_connected = true;
        });
    }

    /// Clear the session in one write
    pub(crate) fn reset(&self) {
        self.update(|state| {
            state.provider = None;
            state.provider_kind = ProviderKind::None;
            state.chain_id = None;
            state.address = None;
            state.is_connected = false;
        });
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectionState)) {
        let (snapshot, changed) = {
            let mut state = self.lock();
            let before = state.clone();
            apply(&mut state);

            let changed = changed_keys(&before, &state);
            if changed.is_empty() {
                return;
            }
            state.epoch += 1;
            (state.clone(), changed)
        };

        trace!(epoch = snapshot.epoch, ?changed, "Connection state changed");

        let listeners = self
            .listeners
            .matching(|keys| keys.iter().any(|key| changed.contains(key)));
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl Default for ConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&ConnectionState) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        (hits, move |_: &ConnectionState| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_commit_and_reset() {
        let store = ConnectionStore::new();
        let provider = Arc::new(MemoryProvider::new());

        store.commit(ProviderHandle::Injected(provider), 1, ADDRESS.to_string());
        let state = store.snapshot();
        assert!(state.is_connected);
        assert_eq!(state.provider_kind, ProviderKind::Injected);
        assert_eq!(state.chain_id, Some(1));
        assert_eq!(state.address.as_deref(), Some(ADDRESS));
        assert_eq!(state.epoch, 1);

        store.reset();
        let state = store.snapshot();
        assert!(state.provider.is_none());
        assert_eq!(state.provider_kind, ProviderKind::None);
        assert_eq!(state.chain_id, None);
        assert_eq!(state.address, None);
        assert!(!state.is_connected);
        assert_eq!(state.epoch, 2);
    }

    #[test]
    fn test_no_op_write_is_silent() {
        let store = ConnectionStore::new();
        let (hits, listener) = counter();
        let _sub = store.subscribe_key(ConnectionKey::ChainId, listener);

        store.set_chain_id(Some(5));
        store.set_chain_id(Some(5));
        store.reset();
        store.reset();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(store.epoch(), 2);
    }

    #[test]
    fn test_key_filtering() {
        let store = ConnectionStore::new();
        let (chain_hits, chain_listener) = counter();
        let (address_hits, address_listener) = counter();
        let (any_hits, any_listener) = counter();

        let _a = store.subscribe_key(ConnectionKey::ChainId, chain_listener);
        let _b = store.subscribe_key(ConnectionKey::Address, address_listener);
        let _c = store.subscribe_keys(
            &[ConnectionKey::ChainId, ConnectionKey::Address],
            any_listener,
        );

        store.set_address(Some(ADDRESS.to_string()));
        assert_eq!(chain_hits.load(Ordering::SeqCst), 0);
        assert_eq!(address_hits.load(Ordering::SeqCst), 1);

        store.commit(
            ProviderHandle::Injected(Arc::new(MemoryProvider::new())),
            137,
            "0x0000000000000000000000000000000000000001".to_string(),
        );
        assert_eq!(chain_hits.load(Ordering::SeqCst), 1);
        assert_eq!(address_hits.load(Ordering::SeqCst), 2);
        // One notification per write even when several watched keys changed
        assert_eq!(any_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listeners_run_in_registration_order_without_lock() {
        let store = Arc::new(ConnectionStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        let reader = store.clone();
        let _a = store.subscribe_key(ConnectionKey::ChainId, move |state| {
            // Reading the store from a listener must not deadlock
            assert_eq!(reader.chain_id(), state.chain_id);
            first.lock().unwrap().push("first");
        });
        let second = order.clone();
        let _b = store.subscribe_key(ConnectionKey::ChainId, move |_| {
            second.lock().unwrap().push("second");
        });

        store.set_chain_id(Some(1));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let store = ConnectionStore::new();
        let (hits, listener) = counter();
        let sub = store.subscribe_key(ConnectionKey::IsConnected, listener);

        store.commit(
            ProviderHandle::Injected(Arc::new(MemoryProvider::new())),
            1,
            ADDRESS.to_string(),
        );
        drop(sub);
        store.reset();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_provider_replacement_is_not_a_change() {
        let store = ConnectionStore::new();
        let provider = Arc::new(MemoryProvider::new());
        let (hits, listener) = counter();
        let _sub = store.subscribe_key(ConnectionKey::Provider, listener);

        store.commit(ProviderHandle::Injected(provider.clone()), 1, ADDRESS.to_string());
        store.commit(ProviderHandle::Injected(provider.clone()), 10, ADDRESS.to_string());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        store.commit(ProviderHandle::Vendor(provider), 10, ADDRESS.to_string());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
