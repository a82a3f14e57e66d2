//! Ethereum JSON-RPC balance oracle
//!
//! Answers `eth_getBalance` at a historical height and `eth_blockNumber`.
//! Quantities are hex-encoded; balances are parsed into `BigInt` without an
//! intermediate fixed-width integer.

use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::reconcile::error::OracleError;
use crate::reconcile::oracle::BalanceOracle;
use crate::types::Layer;

/// Node error messages meaning the requested state was pruned or never existed
const UNAVAILABLE_STATE_MARKERS: [&str; 4] = [
    "missing trie node",
    "header not found",
    "historical state",
    "not available",
];

pub struct EthRpcOracle {
    layer: Layer,
    rpc_url: String,
    client: reqwest::Client,
}

/// JSON-RPC request structure
#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl EthRpcOracle {
    pub fn new(layer: Layer, rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let rpc_url = rpc_url.into();
        info!(layer = %layer, url = %rpc_url, "Initializing ETH balance oracle");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::RpcConnection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            layer,
            rpc_url,
            client,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Make a JSON-RPC call
    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R, OracleError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::RpcConnection(format!("HTTP request failed: {}", e)))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(OracleError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| OracleError::Parse("No result in RPC response".to_string()))
    }
}

#[async_trait]
impl BalanceOracle for EthRpcOracle {
    fn chain_id(&self) -> &str {
        self.layer.as_str()
    }

    async fn balance_at(&self, address: &str, block_number: u64) -> Result<BigInt, OracleError> {
        let height_hex = format!("0x{:x}", block_number);
        let result: String = self
            .rpc_call("eth_getBalance", (address, height_hex))
            .await
            .map_err(|e| classify_unavailable(e, block_number))?;

        let balance = parse_hex_balance(&result)?;
        debug!(layer = %self.layer, block = block_number, balance = %balance, "eth_getBalance");
        Ok(balance)
    }

    async fn latest_block_number(&self) -> Result<u64, OracleError> {
        let result: String = self.rpc_call("eth_blockNumber", ()).await?;
        parse_hex_quantity(&result)
    }
}

/// Pruned-state RPC errors become `BlockUnavailable`
fn classify_unavailable(err: OracleError, block_number: u64) -> OracleError {
    match &err {
        OracleError::Rpc { message, .. } => {
            let lower = message.to_lowercase();
            if UNAVAILABLE_STATE_MARKERS.iter().any(|m| lower.contains(m)) {
                OracleError::BlockUnavailable(block_number)
            } else {
                err
            }
        }
        _ => err,
    }
}

/// Parse a `0x`-prefixed hex quantity that fits in a u64
pub fn parse_hex_quantity(raw: &str) -> Result<u64, OracleError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| OracleError::Parse(format!("Invalid block number {:?}: {}", raw, e)))
}

/// Parse a `0x`-prefixed hex wei balance of any width
pub fn parse_hex_balance(raw: &str) -> Result<BigInt, OracleError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(BigInt::default());
    }
    BigInt::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| OracleError::Parse(format!("Invalid balance {:?}", raw)))
}

/// Validate a 20-byte hex account address and return it lowercased
pub fn parse_address(raw: &str) -> Result<String, OracleError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| OracleError::Parse(format!("Address {:?} missing 0x prefix", raw)))?;
    let bytes = hex::decode(digits)
        .map_err(|e| OracleError::Parse(format!("Address {:?} is not hex: {}", raw, e)))?;
    if bytes.len() != 20 {
        return Err(OracleError::Parse(format!(
            "Address {:?} is {} bytes, expected 20",
            raw,
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}
