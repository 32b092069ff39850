//! Public session state
//!
//! What the host UI renders: the CAIP account, the selected network, the
//! balance and the profile of the connected account. The state is published
//! through a `tokio::sync::watch` channel so any number of observers can
//! await changes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use connectkit_core::types::Token;
use connectkit_core::{CaipAddress, CaipNetwork};

/// State shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    /// Connected account
    pub caip_address: Option<CaipAddress>,
    /// Whether an account is connected
    pub is_connected: bool,
    /// Selected network
    pub selected_network: Option<CaipNetwork>,
    /// Networks the dapp requested
    pub requested_networks: Vec<CaipNetwork>,
    /// Native balance, formatted in whole units
    pub balance: Option<String>,
    /// Currency symbol of the balance
    pub balance_symbol: Option<String>,
    /// Token configured for the selected network
    pub token: Option<Token>,
    /// Explorer page of the account
    pub address_explorer_url: Option<String>,
    /// Profile name
    pub profile_name: Option<String>,
    /// Profile avatar URL
    pub profile_image: Option<String>,
}

impl PublicState {
    /// Chain id of the selected network
    pub fn selected_chain_id(&self) -> Option<u64> {
        self.selected_network.as_ref()?.id.chain_id()
    }

    fn clear_account(&mut self) {
        self.caip_address = None;
        self.is_connected = false;
        self.balance = None;
        self.balance_symbol = None;
        self.address_explorer_url = None;
        self.profile_name = None;
        self.profile_image = None;
    }
}

/// Publisher of [`PublicState`]
#[derive(Debug)]
pub struct SessionState {
    tx: watch::Sender<PublicState>,
}

impl SessionState {
    /// Create an empty session
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PublicState::default());
        Self { tx }
    }

    /// Copy of the current state
    pub fn get(&self) -> PublicState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<PublicState> {
        self.tx.subscribe()
    }

    /// Apply `f`; observers are woken only if the state actually changed
    pub(crate) fn update(&self, f: impl FnOnce(&mut PublicState)) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub(crate) fn set_requested_networks(&self, networks: Vec<CaipNetwork>) {
        self.update(|state| state.requested_networks = networks);
    }

    pub(crate) fn set_selected_network(&self, network: Option<CaipNetwork>) {
        self.update(|state| state.selected_network = network);
    }

    /// Drop the account section and fall back to `network`
    pub(crate) fn reset_account(&self, network: Option<CaipNetwork>) {
        self.update(|state| {
            state.clear_account();
            state.selected_network = network;
            state.token = None;
        });
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectkit_core::CaipNetworkId;

    fn network(chain_id: u64) -> CaipNetwork {
        CaipNetwork {
            id: CaipNetworkId::eip155(chain_id),
            name: None,
            image_id: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_observers_see_changes() {
        let session = SessionState::new();
        let mut rx = session.subscribe();

        session.set_selected_network(Some(network(10)));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().selected_chain_id(), Some(10));
    }

    #[test]
    fn test_unchanged_update_does_not_notify() {
        let session = SessionState::new();
        session.set_selected_network(Some(network(1)));

        let rx = session.subscribe();
        session.set_selected_network(Some(network(1)));
        assert!(!rx.has_changed().unwrap());

        session.set_selected_network(Some(network(137)));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_reset_account() {
        let session = SessionState::new();
        session.update(|state| {
            state.caip_address = Some(CaipAddress::eip155(
                1,
                "0x52908400098527886E0F7030069857D2E4169EE7",
            ));
            state.is_connected = true;
            state.balance = Some("1.0".to_string());
            state.profile_name = Some("vitalik.eth".to_string());
            state.selected_network = Some(network(1));
        });

        session.reset_account(Some(network(137)));
        let state = session.get();
        assert_eq!(state.caip_address, None);
        assert!(!state.is_connected);
        assert_eq!(state.balance, None);
        assert_eq!(state.profile_name, None);
        assert_eq!(state.selected_chain_id(), Some(137));
    }
}
