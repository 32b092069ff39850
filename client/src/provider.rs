//! Wallet provider adapters
//!
//! A provider is anything that accepts EIP-1193 style requests and emits
//! account, chain and session events. The client talks to four kinds of
//! provider through the traits in this module:
//!
//! - [`RelayProvider`]: remote session relay, created lazily by a [`RelayProviderFactory`]
//! - [`WalletProvider`]: injected extension provider, or one announced over discovery
//! - [`VendorProvider`]: first-party vendor SDK provider with cached accounts
//!
//! The active provider is carried as a [`ProviderHandle`], a tagged union
//! whose variant is the provider kind.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use connectkit_core::types::{
    chain_id_from_value, INJECTED_CONNECTOR_ID, VENDOR_CONNECTOR_ID, WALLET_CONNECT_CONNECTOR_ID,
};
use connectkit_core::{Error, ProviderKind};

use crate::events::Subscription;

/// Wallet does not know the requested chain
pub const UNRECOGNIZED_CHAIN_ERROR_CODE: i64 = 4902;
/// Generic wallet failure, raised by some wallets for unknown chains
pub const INTERNAL_ERROR_CODE: i64 = 5000;
/// User rejected the request
pub const USER_REJECTED_ERROR_CODE: i64 = 4001;
/// Provider does not support the method
pub const UNSUPPORTED_METHOD_ERROR_CODE: i64 = 4200;

/// Result of a provider call
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A provider request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    /// RPC method name
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Value,
}

impl RequestArguments {
    /// Create a request
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Create a request without parameters
    pub fn without_params(method: impl Into<String>) -> Self {
        Self::new(method, json!([]))
    }
}

/// Error returned by a provider
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    /// Numeric error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Extra error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderError {
    /// Create an error without data
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach error data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// User rejected the request
    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_ERROR_CODE, "User rejected the request")
    }

    /// Code of the error wrapped by a relay, found at `data.originalError.code`
    pub fn original_error_code(&self) -> Option<i64> {
        self.data
            .as_ref()?
            .get("originalError")?
            .get("code")?
            .as_i64()
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Error::provider(err.code, err.message)
    }
}

/// Kind of provider event a listener is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    /// Account list changed
    AccountsChanged,
    /// Active chain changed
    ChainChanged,
    /// Session ended
    Disconnect,
    /// Pairing URI ready to be displayed
    DisplayUri,
}

/// Event emitted by a provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// New account list, first entry is the active account
    AccountsChanged(Vec<String>),
    /// New chain id, either a hex string or a number
    ChainChanged(Value),
    /// Session ended
    Disconnect,
    /// Pairing URI
    DisplayUri(String),
}

impl ProviderEvent {
    /// Kind of this event
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => ProviderEventKind::ChainChanged,
            ProviderEvent::Disconnect => ProviderEventKind::Disconnect,
            ProviderEvent::DisplayUri(_) => ProviderEventKind::DisplayUri,
        }
    }
}

/// Provider event listener
pub type EventHandler = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

/// EIP-1193 style provider
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Send a request to the wallet
    async fn request(&self, args: RequestArguments) -> ProviderResult<Value>;

    /// Register an event listener
    fn on(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription;

    /// Active account, read from the wallet's signer
    async fn get_address(&self) -> ProviderResult<Option<String>> {
        let accounts = self
            .request(RequestArguments::without_params("eth_accounts"))
            .await?;
        Ok(accounts
            .as_array()
            .and_then(|list| list.first())
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Active chain id
    async fn get_chain_id(&self) -> ProviderResult<Option<u64>> {
        let chain = self
            .request(RequestArguments::without_params("eth_chainId"))
            .await?;
        Ok(chain_id_from_value(&chain))
    }

    /// Whether the provider carries an identification flag such as `isMetaMask`
    fn has_flag(&self, _flag: &str) -> bool {
        false
    }
}

/// Namespace approved in a relay session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNamespace {
    /// Approved CAIP-2 chain ids
    pub chains: Vec<String>,
    /// Approved methods
    pub methods: Vec<String>,
    /// Approved events
    pub events: Vec<String>,
    /// Approved CAIP-10 accounts
    pub accounts: Vec<String>,
}

/// Session relay provider
#[async_trait]
pub trait RelayProvider: WalletProvider {
    /// Start pairing; resolves once the wallet approved the session
    async fn connect(&self) -> ProviderResult<()>;

    /// End the session
    async fn disconnect(&self) -> ProviderResult<()>;

    /// Chain of the session, if one is established
    fn chain_id(&self) -> Option<u64>;

    /// Accounts of the session
    fn accounts(&self) -> Vec<String>;

    /// Approved namespace, if the session has one
    fn session_namespace(&self, namespace: &str) -> Option<SessionNamespace>;
}

/// Vendor SDK provider
pub trait VendorProvider: WalletProvider {
    /// Accounts the SDK remembers from a previous session
    fn cached_accounts(&self) -> Vec<String>;
}

/// Options passed to the relay factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayProviderOptions {
    /// Relay project id
    pub project_id: String,
    /// Whether the relay shows its own QR modal
    pub show_qr_modal: bool,
    /// Required chains
    pub chains: Vec<u64>,
    /// Chains the session may additionally approve
    pub optional_chains: Vec<u64>,
    /// Reported SDK version
    pub sdk_version: String,
}

impl RelayProviderOptions {
    /// Options for a project supporting `chains`
    ///
    /// The relay is never asked to require a chain, so every supported chain
    /// is optional and the placeholder chain `0` is the only required one.
    pub fn new(project_id: impl Into<String>, chains: Vec<u64>, sdk_version: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            show_qr_modal: false,
            chains: vec![0],
            optional_chains: chains,
            sdk_version: sdk_version.into(),
        }
    }
}

/// Asynchronous relay provider construction
#[async_trait]
pub trait RelayProviderFactory: Send + Sync {
    /// Create the relay provider
    async fn init(&self, options: RelayProviderOptions) -> ProviderResult<Arc<dyn RelayProvider>>;
}

/// The active provider, tagged by kind
#[derive(Clone)]
pub enum ProviderHandle {
    /// Session relay
    Relay(Arc<dyn RelayProvider>),
    /// Injected extension
    Injected(Arc<dyn WalletProvider>),
    /// Discovery-announced wallet, remembered by its announced name
    Discovery {
        /// Announced wallet name
        name: String,
        /// Announced provider
        provider: Arc<dyn WalletProvider>,
    },
    /// Vendor SDK
    Vendor(Arc<dyn VendorProvider>),
}

impl ProviderHandle {
    /// Provider kind
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderHandle::Relay(_) => ProviderKind::Relay,
            ProviderHandle::Injected(_) => ProviderKind::Injected,
            ProviderHandle::Discovery { .. } => ProviderKind::Discovery,
            ProviderHandle::Vendor(_) => ProviderKind::Vendor,
        }
    }

    /// Value persisted as the wallet choice: the connector id, or the
    /// announced name for discovery wallets
    pub fn wallet_choice(&self) -> String {
        match self {
            ProviderHandle::Relay(_) => WALLET_CONNECT_CONNECTOR_ID.to_string(),
            ProviderHandle::Injected(_) => INJECTED_CONNECTOR_ID.to_string(),
            ProviderHandle::Discovery { name, .. } => name.clone(),
            ProviderHandle::Vendor(_) => VENDOR_CONNECTOR_ID.to_string(),
        }
    }

    /// Send a request through the provider's own transport
    pub async fn request(&self, args: RequestArguments) -> ProviderResult<Value> {
        match self {
            ProviderHandle::Relay(relay) => relay.request(args).await,
            ProviderHandle::Injected(provider) => provider.request(args).await,
            ProviderHandle::Discovery { provider, .. } => provider.request(args).await,
            ProviderHandle::Vendor(vendor) => vendor.request(args).await,
        }
    }

    /// Register an event listener
    pub fn on(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription {
        match self {
            ProviderHandle::Relay(relay) => relay.on(kind, handler),
            ProviderHandle::Injected(provider) => provider.on(kind, handler),
            ProviderHandle::Discovery { provider, .. } => provider.on(kind, handler),
            ProviderHandle::Vendor(vendor) => vendor.on(kind, handler),
        }
    }

    /// Active account
    pub async fn get_address(&self) -> ProviderResult<Option<String>> {
        match self {
            ProviderHandle::Relay(relay) => Ok(relay.accounts().into_iter().next()),
            ProviderHandle::Injected(provider) => provider.get_address().await,
            ProviderHandle::Discovery { provider, .. } => provider.get_address().await,
            ProviderHandle::Vendor(vendor) => vendor.get_address().await,
        }
    }

    /// Active chain id
    pub async fn get_chain_id(&self) -> ProviderResult<Option<u64>> {
        match self {
            ProviderHandle::Relay(relay) => Ok(relay.chain_id()),
            ProviderHandle::Injected(provider) => provider.get_chain_id().await,
            ProviderHandle::Discovery { provider, .. } => provider.get_chain_id().await,
            ProviderHandle::Vendor(vendor) => vendor.get_chain_id().await,
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderHandle::Discovery { name, .. } => {
                f.debug_struct("Discovery").field("name", name).finish()
            }
            other => write!(f, "{:?}", other.kind()),
        }
    }
}
