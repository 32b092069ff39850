//! Configuration management for connectkit
//!
//! This module provides the configuration structure consumed by the modal
//! client and the CLI. Configuration can be built in code with the fluent
//! builder or loaded from YAML/JSON files; missing sections fall back to
//! defaults.
//!
//! # Example
//!
//! ```no_run
//! use connectkit_core::config::ClientConfig;
//!
//! // Create configuration with builder pattern
//! let config = ClientConfig::builder()
//!     .with_project_id("c1f2...")
//!     .with_chains(vec![1, 137])
//!     .with_default_chain(1)
//!     .build();
//! config.validate()?;
//!
//! // Load configuration from file
//! let config = ClientConfig::from_file("connectkit.yaml")?;
//! # Ok::<(), connectkit_core::Error>(())
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Token;

/// Identity API used for profile name/avatar resolution
pub const DEFAULT_IDENTITY_URL: &str = "https://rpc.walletconnect.com/v1/identity";

/// Main configuration structure for the client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Project identification
    pub project: ProjectSettings,
    /// Requested networks
    pub networks: NetworkSettings,
    /// Connector discovery settings
    pub connectors: ConnectorSettings,
    /// Persisted state settings
    pub storage: StorageSettings,
    /// Remote lookup settings
    pub rpc: RpcSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Project identification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Relay project id, required
    pub project_id: String,
    /// SDK version reported to the relay, defaults to the crate version
    pub sdk_version: Option<String>,
}

/// Requested network settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Chains the dapp supports
    pub chains: Vec<u64>,
    /// Chain selected before any wallet is connected
    pub default_chain: Option<u64>,
    /// Per-chain image URL overrides
    pub chain_images: HashMap<u64, String>,
    /// Per-chain token shown instead of the native currency
    pub tokens: HashMap<u64, Token>,
}

/// Connector discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    /// Listen for discovery-announced wallets
    pub enable_discovery: bool,
}

/// Persisted state settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the persisted wallet choice
    pub path: PathBuf,
}

/// Remote lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Identity API base URL
    pub identity_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    pub level: LogLevel,
    /// Log format (text, json)
    pub format: LogFormat,
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Log format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format
    Text,
    /// JSON format
    Json,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            enable_discovery: true,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            path: data_dir.join("connectkit"),
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse YAML config: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Load configuration from a file (auto-detects format by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(Error::config(format!(
                "Unsupported config file format: {}. Supported: .yaml, .yml, .json",
                extension
            ))),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::config(format!("Failed to serialize config to YAML: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::config(format!("Failed to write config file: {}", e)))
    }

    /// Save configuration to a JSON file
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config to JSON: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::config(format!("Failed to write config file: {}", e)))
    }

    /// Check the settings the client cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.project.project_id.trim().is_empty() {
            return Err(Error::config("projectId is undefined"));
        }

        if let Some(default_chain) = self.networks.default_chain {
            if !self.networks.chains.is_empty() && !self.networks.chains.contains(&default_chain) {
                return Err(Error::InvalidConfig(format!(
                    "default chain {} is not one of the requested chains",
                    default_chain
                )));
            }
        }

        if self.rpc.timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "rpc timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_seconds)
    }

    /// SDK version reported to the relay
    pub fn sdk_version(&self) -> String {
        self.project
            .sdk_version
            .clone()
            .unwrap_or_else(|| format!("rust-connectkit-{}", crate::VERSION))
    }
}

impl LogLevel {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Builder for ClientConfig with fluent interface
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the relay project id
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project.project_id = project_id.into();
        self
    }

    /// Set the reported SDK version
    pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
        self.config.project.sdk_version = Some(version.into());
        self
    }

    /// Set the requested chains
    pub fn with_chains(mut self, chains: Vec<u64>) -> Self {
        self.config.networks.chains = chains;
        self
    }

    /// Set the default chain
    pub fn with_default_chain(mut self, chain_id: u64) -> Self {
        self.config.networks.default_chain = Some(chain_id);
        self
    }

    /// Override the image of a chain
    pub fn with_chain_image(mut self, chain_id: u64, url: impl Into<String>) -> Self {
        self.config.networks.chain_images.insert(chain_id, url.into());
        self
    }

    /// Show a token instead of the native currency on a chain
    pub fn with_token(mut self, chain_id: u64, token: Token) -> Self {
        self.config.networks.tokens.insert(chain_id, token);
        self
    }

    /// Enable or disable discovery-announced wallets
    pub fn with_discovery(mut self, enabled: bool) -> Self {
        self.config.connectors.enable_discovery = enabled;
        self
    }

    /// Set the persisted state directory
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.path = path.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_rpc_timeout(mut self, seconds: u64) -> Self {
        self.config.rpc.timeout_seconds = seconds;
        self
    }

    /// Set the identity API base URL
    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.config.rpc.identity_url = url.into();
        self
    }

    /// Set log level
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
