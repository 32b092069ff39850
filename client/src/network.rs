//! Network switch negotiation
//!
//! Switching asks the active wallet to change chain. A wallet that does not
//! know the chain answers with an "unrecognized chain" error, in which case
//! the chain is registered with `wallet_addEthereumChain` instead. Vendor
//! wallets are lenient: their failures are logged and the switch is ignored.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use connectkit_core::types::{chain_id_to_hex, ADD_CHAIN_METHOD, SWITCH_CHAIN_METHOD};
use connectkit_core::{ChainRegistry, Error, Result};

use crate::engine::SyncEngine;
use crate::provider::{
    ProviderError, ProviderHandle, RequestArguments, INTERNAL_ERROR_CODE,
    UNRECOGNIZED_CHAIN_ERROR_CODE,
};

/// Result of a switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The wallet switched and the store follows
    Switched,
    /// The wallet did not know the chain and was asked to register it
    Registered,
    /// The vendor wallet failed and the failure was logged
    Ignored,
}

/// How a switch failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchFailure {
    /// The wallet does not know the chain; register it
    UnrecognizedChain,
    /// Any other failure
    Rejected,
}

/// Classify a failed switch request
pub fn classify_switch_error(err: &ProviderError) -> SwitchFailure {
    let unrecognized = err.code == UNRECOGNIZED_CHAIN_ERROR_CODE
        || err.code == INTERNAL_ERROR_CODE
        || err.original_error_code() == Some(UNRECOGNIZED_CHAIN_ERROR_CODE);

    if unrecognized {
        SwitchFailure::UnrecognizedChain
    } else {
        SwitchFailure::Rejected
    }
}

fn is_lenient(handle: &ProviderHandle) -> bool {
    match handle {
        ProviderHandle::Vendor(_) => true,
        ProviderHandle::Relay(_) | ProviderHandle::Injected(_) | ProviderHandle::Discovery { .. } => {
            false
        }
    }
}

/// Switches the active provider's chain
pub struct NetworkNegotiator {
    engine: Arc<SyncEngine>,
    chains: Arc<ChainRegistry>,
}

impl NetworkNegotiator {
    /// Create a negotiator writing through `engine`
    pub fn new(engine: Arc<SyncEngine>, chains: Arc<ChainRegistry>) -> Self {
        Self { engine, chains }
    }

    /// Ask the active provider to switch to `chain_id`
    #[instrument(skip(self))]
    pub async fn switch_network(&self, chain_id: u64) -> Result<SwitchOutcome> {
        let handle = self
            .engine
            .store()
            .provider()
            .ok_or_else(|| Error::not_connected("No active provider to switch networks"))?;

        let request = RequestArguments::new(
            SWITCH_CHAIN_METHOD,
            json!([{ "chainId": chain_id_to_hex(chain_id) }]),
        );

        match handle.request(request).await {
            Ok(_) => {
                info!("Switched {} provider to chain {}", handle.kind(), chain_id);
                self.engine.set_chain_id(chain_id);
                Ok(SwitchOutcome::Switched)
            }
            Err(err) => match classify_switch_error(&err) {
                SwitchFailure::UnrecognizedChain => self.register_chain(&handle, chain_id).await,
                SwitchFailure::Rejected if is_lenient(&handle) => {
                    debug!("Ignoring vendor switch failure: {}", err);
                    Ok(SwitchOutcome::Ignored)
                }
                SwitchFailure::Rejected => {
                    warn!("Switch to chain {} failed: {}", chain_id, err);
                    Err(Error::chain_not_supported())
                }
            },
        }
    }

    /// Ask the provider to register `chain_id`; the wallet usually switches
    /// to it once registered and reports that through `chainChanged`
    async fn register_chain(&self, handle: &ProviderHandle, chain_id: u64) -> Result<SwitchOutcome> {
        let lenient = is_lenient(handle);

        let Some(params) = self.chains.add_chain_params(chain_id) else {
            if lenient {
                debug!("No registration data for chain {}, ignoring", chain_id);
                return Ok(SwitchOutcome::Ignored);
            }
            return Err(Error::chain_not_supported());
        };

        let request = RequestArguments::new(
            ADD_CHAIN_METHOD,
            Value::Array(vec![serde_json::to_value(params)?]),
        );
        match handle.request(request).await {
            Ok(_) => {
                info!("Registered chain {} with the {} provider", chain_id, handle.kind());
                Ok(SwitchOutcome::Registered)
            }
            Err(err) if lenient => {
                debug!("Ignoring vendor registration failure: {}", err);
                Ok(SwitchOutcome::Ignored)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineContext;
    use crate::memory::MemoryProvider;
    use crate::session::SessionState;
    use crate::store::ConnectionStore;
    use async_trait::async_trait;
    use connectkit_core::{BalanceFetcher, MemoryStore, Profile, ProfileResolver};
    use std::collections::HashMap;

    const ADDRESS: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    struct NoLookups;

    #[async_trait]
    impl BalanceFetcher for NoLookups {
        async fn fetch_balance(&self, _: &str, _: u64, _: &str) -> Result<u128> {
            Ok(0)
        }
    }

    #[async_trait]
    impl ProfileResolver for NoLookups {
        async fn resolve_profile(&self, _: &str) -> Result<Profile> {
            Ok(Profile::default())
        }
    }

    fn negotiator() -> NetworkNegotiator {
        let chains = Arc::new(ChainRegistry::with_presets());
        let engine = SyncEngine::new(EngineContext {
            store: Arc::new(ConnectionStore::new()),
            session: Arc::new(SessionState::new()),
            persisted: Arc::new(MemoryStore::new()),
            chains: chains.clone(),
            balances: Arc::new(NoLookups),
            profiles: Arc::new(NoLookups),
            tokens: HashMap::new(),
            default_network: None,
        });
        NetworkNegotiator::new(engine, chains)
    }

    async fn connect(negotiator: &NetworkNegotiator, handle: ProviderHandle) {
        assert!(negotiator.engine.activate(handle).await);
    }

    fn wallet() -> Arc<MemoryProvider> {
        Arc::new(
            MemoryProvider::new()
                .with_accounts(vec![ADDRESS.to_string()])
                .with_chain_id(1)
                .with_known_chains(&[10]),
        )
    }

    #[test]
    fn test_classify_switch_error() {
        assert_eq!(
            classify_switch_error(&ProviderError::new(4902, "Unrecognized chain")),
            SwitchFailure::UnrecognizedChain
        );
        assert_eq!(
            classify_switch_error(&ProviderError::new(5000, "Internal")),
            SwitchFailure::UnrecognizedChain
        );
        assert_eq!(
            classify_switch_error(
                &ProviderError::new(-32603, "Relay error")
                    .with_data(json!({"originalError": {"code": 4902}}))
            ),
            SwitchFailure::UnrecognizedChain
        );
        assert_eq!(
            classify_switch_error(&ProviderError::user_rejected()),
            SwitchFailure::Rejected
        );
    }

    #[tokio::test]
    async fn test_switch_without_provider() {
        let negotiator = negotiator();
        let err = negotiator.switch_network(10).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_successful_switch_updates_store() {
        let negotiator = negotiator();
        let provider = wallet();
        connect(&negotiator, ProviderHandle::Injected(provider.clone())).await;

        let outcome = negotiator.switch_network(10).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched);
        assert_eq!(negotiator.engine.store().chain_id(), Some(10));

        let request = provider.requests().pop().unwrap();
        assert_eq!(request.method, SWITCH_CHAIN_METHOD);
        assert_eq!(request.params, json!([{"chainId": "0xa"}]));
    }

    #[tokio::test]
    async fn test_unknown_chain_is_registered() {
        let negotiator = negotiator();
        let provider = wallet();
        connect(&negotiator, ProviderHandle::Relay(provider.clone())).await;

        let outcome = negotiator.switch_network(137).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Registered);

        let requests = provider.requests();
        let add = requests
            .iter()
            .find(|request| request.method == ADD_CHAIN_METHOD)
            .unwrap();
        assert_eq!(add.params[0]["chainId"], json!("0x89"));
        assert_eq!(add.params[0]["chainName"], json!("Polygon"));
        assert_eq!(add.params[0]["nativeCurrency"]["symbol"], json!("MATIC"));
        assert_eq!(add.params[0]["rpcUrls"], json!(["https://polygon-rpc.com"]));
        assert_eq!(add.params[0]["blockExplorerUrls"], json!(["https://polygonscan.com"]));

        // The wallet switched after registering and reported it
        assert_eq!(negotiator.engine.store().chain_id(), Some(137));
    }

    #[tokio::test]
    async fn test_registration_does_not_retry_switch() {
        let negotiator = negotiator();
        let provider = wallet();
        provider.respond_to(ADD_CHAIN_METHOD, |_| Ok(Value::Null));
        connect(&negotiator, ProviderHandle::Injected(provider.clone())).await;

        let outcome = negotiator.switch_network(137).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Registered);

        let requests = provider.requests();
        let add = requests
            .iter()
            .find(|request| request.method == ADD_CHAIN_METHOD)
            .unwrap();
        assert_eq!(add.params[0]["chainId"], json!("0x89"));
        assert_eq!(
            requests
                .iter()
                .filter(|request| request.method == SWITCH_CHAIN_METHOD)
                .count(),
            1
        );

        // Registering alone leaves the wallet on its current chain
        assert_eq!(negotiator.engine.store().chain_id(), Some(1));
    }

    #[tokio::test]
    async fn test_wrapped_unrecognized_chain_is_registered() {
        let negotiator = negotiator();
        let provider = wallet();
        provider.respond_to(SWITCH_CHAIN_METHOD, |_| {
            Err(ProviderError::new(-32603, "Relay error")
                .with_data(json!({"originalError": {"code": 4902}})))
        });
        connect(&negotiator, ProviderHandle::Relay(provider.clone())).await;

        let outcome = negotiator.switch_network(42161).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Registered);
        assert!(provider
            .request_methods()
            .contains(&ADD_CHAIN_METHOD.to_string()));
    }

    #[tokio::test]
    async fn test_other_failure_is_chain_not_supported() {
        let negotiator = negotiator();
        let provider = wallet();
        provider.respond_to(SWITCH_CHAIN_METHOD, |_| Err(ProviderError::new(99999, "nope")));
        connect(&negotiator, ProviderHandle::Injected(provider.clone())).await;

        let err = negotiator.switch_network(10).await.unwrap_err();
        assert!(err.is_chain_not_supported());
        assert_eq!(err.to_string(), "Chain is not supported");
        assert_eq!(negotiator.engine.store().chain_id(), Some(1));
        assert!(!provider
            .request_methods()
            .contains(&ADD_CHAIN_METHOD.to_string()));
    }

    #[tokio::test]
    async fn test_vendor_failures_are_ignored() {
        let negotiator = negotiator();
        let provider = wallet();
        provider.respond_to(SWITCH_CHAIN_METHOD, |_| Err(ProviderError::new(99999, "nope")));
        connect(&negotiator, ProviderHandle::Vendor(provider.clone())).await;

        let outcome = negotiator.switch_network(10).await.unwrap();
        assert_eq!(outcome, SwitchOutcome::Ignored);
        assert_eq!(negotiator.engine.store().chain_id(), Some(1));
    }

    #[tokio::test]
    async fn test_registration_failure_propagates() {
        let negotiator = negotiator();
        let provider = wallet();
        provider.respond_to(ADD_CHAIN_METHOD, |_| Err(ProviderError::user_rejected()));
        connect(&negotiator, ProviderHandle::Discovery {
            name: "MetaMask".to_string(),
            provider: provider.clone(),
        })
        .await;

        let err = negotiator.switch_network(137).await.unwrap_err();
        assert!(matches!(err, Error::Provider { code: 4001, .. }));
    }

    #[tokio::test]
    async fn test_unknown_chain_without_metadata() {
        let negotiator = negotiator();
        connect(&negotiator, ProviderHandle::Injected(wallet())).await;

        let err = negotiator.switch_network(777_777).await.unwrap_err();
        assert!(err.is_chain_not_supported());
    }
}
