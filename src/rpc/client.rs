//! JSON-RPC client for a Solana node, plus the optional holder indexer.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::TransactionView;
use crate::rpc::types::{
    HolderEntry, KeyedTokenAccount, LargestAccount, MultiAccount, RpcEnvelope, TransactionResult,
    WithContext,
};
use crate::rpc::{LedgerSource, RpcError};
use crate::trading::MirrorConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Holders requested from the indexer per lookup.
const INDEXER_HOLDER_LIMIT: usize = 100;

/// Token accounts resolved to owners when falling back to the node.
const FALLBACK_HOLDER_LIMIT: usize = 20;

/// Thin JSON-RPC client. Transient transport failures are retried with
/// exponential backoff; node-level errors are surfaced as [`RpcError::Node`].
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    holder_api_url: Option<String>,
    holder_api_key: Option<String>,
}

impl RpcClient {
    pub fn new(config: &MirrorConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: config.rpc_url.clone(),
            holder_api_url: config.holder_api_url.clone(),
            holder_api_key: config.holder_api_key.clone(),
        })
    }

    /// Issue one JSON-RPC call with retries on transient transport errors.
    /// `Ok(None)` means the node answered with a null result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            self.call_once(method, params.clone()).await.map_err(|err| match err {
                // Decode failures will not fix themselves on retry.
                RpcError::Http(http) if !http.is_decode() => {
                    backoff::Error::transient(RpcError::Http(http))
                }
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!(method, "Sending RPC request");
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let envelope: RpcEnvelope<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope.result)
    }

    /// Fetch a transaction at the given commitment level and normalize it.
    pub async fn transaction_at(
        &self,
        signature: &str,
        commitment: &str,
    ) -> Result<Option<TransactionView>, RpcError> {
        let params = json!([signature, {
            "encoding": "jsonParsed",
            "commitment": commitment,
            "maxSupportedTransactionVersion": 0,
        }]);
        let result: Option<TransactionResult> = self.call("getTransaction", params).await?;
        Ok(result.and_then(|tx| tx.into_view(signature)))
    }

    /// Submit a signed, base64-encoded transaction. Submission is not
    /// idempotent, so this path never retries; the caller decides what a
    /// failed send means.
    pub async fn send_transaction(&self, tx_base64: &str) -> Result<String, RpcError> {
        let params = json!([tx_base64, {
            "encoding": "base64",
            "preflightCommitment": "confirmed",
        }]);
        self.call_once::<String>("sendTransaction", params)
            .await?
            .ok_or(RpcError::MissingResult {
                method: "sendTransaction",
            })
    }

    /// Query the holder indexer, if one is configured. `None` means the
    /// indexer is absent, unreachable, or returned nothing useful.
    async fn indexer_holders(&self, asset: &str) -> Option<Vec<String>> {
        let (base, key) = match (&self.holder_api_url, &self.holder_api_key) {
            (Some(base), Some(key)) => (base, key),
            _ => return None,
        };

        let url =
            format!("{base}/v0/token-holders?api-key={key}&mint={asset}&limit={INDEXER_HOLDER_LIMIT}");
        let response = match self.http.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Holder indexer unreachable, falling back to node");
                return None;
            }
        };

        match response.json::<Vec<HolderEntry>>().await {
            Ok(entries) => Some(entries.into_iter().filter_map(|e| e.owner).collect()),
            Err(err) => {
                warn!(error = %err, "Holder indexer returned malformed data");
                None
            }
        }
    }

    /// Resolve the owners of the largest token accounts for `asset`. The
    /// largest-accounts call returns token accounts, not wallets, so each
    /// address is resolved to its owning wallet before use.
    async fn largest_account_owners(&self, asset: &str) -> Result<Vec<String>, RpcError> {
        let largest: WithContext<Vec<LargestAccount>> = self
            .call("getTokenLargestAccounts", json!([asset, {"commitment": "confirmed"}]))
            .await?
            .ok_or(RpcError::MissingResult {
                method: "getTokenLargestAccounts",
            })?;

        let addresses: Vec<String> = largest
            .value
            .into_iter()
            .take(FALLBACK_HOLDER_LIMIT)
            .map(|account| account.address)
            .collect();
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let accounts: WithContext<Vec<Option<MultiAccount>>> = self
            .call(
                "getMultipleAccounts",
                json!([addresses, {"encoding": "jsonParsed", "commitment": "confirmed"}]),
            )
            .await?
            .ok_or(RpcError::MissingResult {
                method: "getMultipleAccounts",
            })?;

        Ok(accounts
            .value
            .into_iter()
            .flatten()
            .filter_map(|account| account.token_owner())
            .collect())
    }
}

#[async_trait]
impl LedgerSource for RpcClient {
    async fn transaction(&self, signature: &str) -> Result<Option<TransactionView>, RpcError> {
        self.transaction_at(signature, "confirmed").await
    }

    async fn native_balance(&self, account: &str) -> Result<u64, RpcError> {
        let balance: WithContext<u64> = self
            .call("getBalance", json!([account, {"commitment": "confirmed"}]))
            .await?
            .ok_or(RpcError::MissingResult { method: "getBalance" })?;
        Ok(balance.value)
    }

    async fn token_balance(&self, owner: &str, asset: &str) -> Result<u64, RpcError> {
        let params = json!([owner, {"mint": asset}, {
            "encoding": "jsonParsed",
            "commitment": "confirmed",
        }]);
        let accounts: WithContext<Vec<KeyedTokenAccount>> = self
            .call("getTokenAccountsByOwner", params)
            .await?
            .ok_or(RpcError::MissingResult {
                method: "getTokenAccountsByOwner",
            })?;

        Ok(accounts
            .value
            .iter()
            .map(|account| account.token_amount())
            .sum())
    }

    async fn top_holders(&self, asset: &str) -> Result<Vec<String>, RpcError> {
        if let Some(holders) = self.indexer_holders(asset).await {
            if !holders.is_empty() {
                debug!(asset, count = holders.len(), "Resolved holders via indexer");
                return Ok(holders);
            }
        }
        self.largest_account_owners(asset).await
    }
}
