//! Wallet RPC client: one JSON-RPC exchange per call.
//!
//! Each call builds a fresh [`reqwest::Client`] so no pooled connection can
//! carry stale peer state from a previous exchange with the node. Responses
//! are streamed with a hard size cap and an empty body is treated as an
//! error rather than a silent success.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::errors::{PaywallError, Result};
use crate::types::{ProofCheck, RpcRequest, RpcResponse};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hard cap on a response body; larger responses abort mid-stream.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Sub-path every wallet RPC method is posted to.
const RPC_PATH: &str = "json_rpc";

/// Client for a single request/response exchange with one wallet RPC node.
#[derive(Debug, Clone)]
pub struct WalletRpcClient {
    timeout: std::time::Duration,
}

impl WalletRpcClient {
    /// Creates a client with the default 30 second per-call timeout.
    pub fn new() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issues one JSON-RPC call to `node_url` and returns the `result`
    /// payload.
    ///
    /// Fails on connection errors, timeout, an oversized or empty body, or
    /// a protocol-level error surfaced by the remote peer.
    pub async fn call(&self, node_url: &str, method: &str, params: Option<Value>) -> Result<Value> {
        let endpoint = Url::parse(node_url)?.join(RPC_PATH)?;
        let request = RpcRequest::new(method, params);

        debug!(method, "wallet rpc call");

        // Fresh transport per call: no pooling, no stale peer state.
        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client.post(endpoint).json(&request).send().await?;

        let body = self.read_capped(response).await?;
        if body.is_empty() {
            return Err(PaywallError::NodeUnavailable(
                "empty response body from wallet RPC".to_string(),
            ));
        }

        let envelope: RpcResponse = serde_json::from_slice(&body)?;
        if let Some(err) = envelope.error {
            return Err(PaywallError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        envelope.result.ok_or_else(|| {
            PaywallError::NodeUnavailable("wallet RPC response carried no result".to_string())
        })
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>> {
        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_BYTES {
                return Err(PaywallError::NodeUnavailable(format!(
                    "wallet RPC response too large: {len} bytes"
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(PaywallError::NodeUnavailable(
                    "wallet RPC response exceeded size cap".to_string(),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Re-points the wallet's upstream ledger connection. Best-effort from
    /// the orchestrator's perspective; failures here are logged and ignored.
    pub async fn set_daemon(&self, node_url: &str, daemon_address: &str) -> Result<()> {
        self.call(
            node_url,
            "set_daemon",
            Some(json!({ "address": daemon_address, "trusted": false })),
        )
        .await?;
        Ok(())
    }

    /// Liveness probe: asks the wallet for its current blockchain height.
    pub async fn get_height(&self, node_url: &str) -> Result<u64> {
        let result = self.call(node_url, "get_height", None).await?;
        result
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                PaywallError::NodeUnavailable("get_height response missing height".to_string())
            })
    }

    /// Checks a transaction proof: how much `txid` paid to `address`,
    /// according to the transaction private key.
    ///
    /// All three response fields (`received`, `confirmations`, `in_pool`)
    /// are required; a response missing any of them is a protocol error.
    pub async fn check_tx_key(
        &self,
        node_url: &str,
        txid: &str,
        tx_key: &str,
        address: &str,
    ) -> Result<ProofCheck> {
        let result = self
            .call(
                node_url,
                "check_tx_key",
                Some(json!({
                    "txid": txid,
                    "tx_key": tx_key,
                    "address": address,
                })),
            )
            .await?;

        let proof: ProofCheck = serde_json::from_value(result).map_err(|e| {
            PaywallError::VerificationFailed(format!("malformed check_tx_key response: {e}"))
        })?;
        Ok(proof)
    }
}

impl Default for WalletRpcClient {
    fn default() -> Self {
        Self::new()
    }
}
