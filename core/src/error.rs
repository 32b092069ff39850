//! Error types for the connectkit core library
//!
//! This module defines the error hierarchy shared by every connectkit crate,
//! from configuration problems detected at construction time to chain switch
//! failures surfaced to the caller of a user-triggered action.

/// Result type alias for connectkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for connectkit operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (missing adapter, missing project id, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wallet provider request failed
    #[error("Provider error {code}: {message}")]
    Provider {
        /// Provider error code
        code: i64,
        /// Provider error message
        message: String,
    },

    /// The wallet refused or does not know the requested chain
    #[error("{0}")]
    ChainNotSupported(String),

    /// No provider is active
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Requested connector is not registered
    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    /// JSON-RPC communication error
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Persisted state error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid chain identifier
    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    /// Operation not supported
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// State error (e.g. client not initialized)
    #[error("State error: {0}")]
    State(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new provider error
    pub fn provider(code: i64, msg: impl Into<String>) -> Self {
        Self::Provider {
            code,
            message: msg.into(),
        }
    }

    /// Create the terminal chain switch error
    pub fn chain_not_supported() -> Self {
        Self::ChainNotSupported("Chain is not supported".to_string())
    }

    /// Create a new not connected error
    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::NotConnected(msg.into())
    }

    /// Create a new RPC error
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a new state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Check if error is a configuration problem
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidConfig(_))
    }

    /// Check if error is the terminal chain switch failure
    pub fn is_chain_not_supported(&self) -> bool {
        matches!(self, Self::ChainNotSupported(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML error: {}", err))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::InvalidChainId(format!("Failed to parse chain id: {}", err))
    }
}
