//! Remote lookups for session enrichment
//!
//! This module provides the two best-effort lookups the client performs
//! after an account becomes active:
//! - native balance through the chain's public JSON-RPC endpoint
//! - profile name and avatar through the identity API
//!
//! Both sit behind traits so hosts can plug in their own transport.
//!
//! # Example
//!
//! ```no_run
//! use connectkit_core::rpc::{BalanceFetcher, JsonRpcClient, format_ether};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JsonRpcClient::new(std::time::Duration::from_secs(30))?;
//!     let wei = client
//!         .fetch_balance("https://cloudflare-eth.com", 1, "0x52908400098527886E0F7030069857D2E4169EE7")
//!         .await?;
//!     println!("Balance: {} ETH", format_ether(wei));
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Decimals of every EVM native currency
pub const ETHER_DECIMALS: u32 = 18;

/// Native balance lookup
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    /// Balance of `address` in wei
    async fn fetch_balance(&self, rpc_url: &str, chain_id: u64, address: &str) -> Result<u128>;
}

/// Resolved profile of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Reverse-resolved name
    pub name: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
}

/// Profile name/avatar lookup
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Resolve the profile of `address`; an unknown account is an empty profile
    async fn resolve_profile(&self, address: &str) -> Result<Profile>;
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Call result
    pub result: Option<Value>,
    /// Call error
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Turn the envelope into the call result
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::rpc(format!("{} ({})", error.message, error.code)));
        }
        self.result
            .ok_or_else(|| Error::rpc("Response carries neither result nor error"))
    }
}

/// Minimal JSON-RPC over HTTP client
pub struct JsonRpcClient {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client with a request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Issue one JSON-RPC call
    #[instrument(skip(self, params))]
    pub async fn call(&self, rpc_url: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: JsonRpcResponse = self
            .http
            .post(rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_result()
    }
}

#[async_trait]
impl BalanceFetcher for JsonRpcClient {
    async fn fetch_balance(&self, rpc_url: &str, chain_id: u64, address: &str) -> Result<u128> {
        debug!("Fetching balance of {} on chain {}", address, chain_id);
        let result = self
            .call(rpc_url, "eth_getBalance", json!([address, "latest"]))
            .await?;

        let quantity = result
            .as_str()
            .ok_or_else(|| Error::rpc("eth_getBalance returned a non-string result"))?;
        parse_quantity(quantity)
    }
}

/// Identity API client
pub struct IdentityResolver {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
}

impl IdentityResolver {
    /// Create a resolver for a project
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            project_id: project_id.into(),
        })
    }

    fn identity_url(&self, address: &str) -> String {
        format!(
            "{}/{}?projectId={}",
            self.base_url.trim_end_matches('/'),
            address,
            self.project_id
        )
    }
}

#[async_trait]
impl ProfileResolver for IdentityResolver {
    #[instrument(skip(self))]
    async fn resolve_profile(&self, address: &str) -> Result<Profile> {
        let response = self.http.get(self.identity_url(address)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Profile::default());
        }

        Ok(response.error_for_status()?.json().await?)
    }
}

/// Parse a hex encoded JSON-RPC quantity
pub fn parse_quantity(quantity: &str) -> Result<u128> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| Error::rpc(format!("Quantity is not hex encoded: {}", quantity)))?;

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| Error::rpc(format!("Invalid quantity {}: {}", quantity, e)))
}

/// Format a wei amount as ether, keeping at least one fractional digit
pub fn format_ether(wei: u128) -> String {
    format_units(wei, ETHER_DECIMALS)
}

/// Format an integer amount with `decimals` fractional digits
pub fn format_units(amount: u128, decimals: u32) -> String {
    let base = 10u128.pow(decimals);
    let whole = amount / base;
    let fraction = amount % base;

    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, fraction)
    }
}
