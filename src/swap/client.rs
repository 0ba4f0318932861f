//! Jupiter aggregator client for swap execution.
//!
//! A swap goes through four stages:
//! - quote the pair through the aggregator
//! - have the aggregator build an unsigned transaction for the quote
//! - sign it with the follower wallet and submit it through the node
//! - poll the node until the order finalizes to learn what was received

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::models::NATIVE_MINT;
use crate::rpc::RpcClient;
use crate::swap::{SettlementStatus, SwapError, SwapExecutor, Wallet};
use crate::trading::MirrorConfig;

/// Jupiter v6 quote/swap API.
const JUPITER_V6_URL: &str = "https://quote-api.jup.ag/v6";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response from the aggregator's swap endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(default)]
    swap_transaction: Option<String>,
}

pub struct AggregatorClient {
    http: reqwest::Client,
    base_url: String,
    rpc: Arc<RpcClient>,
    wallet: Wallet,
    settle_delay: Duration,
    settle_attempts: u32,
}

impl AggregatorClient {
    pub fn new(config: &MirrorConfig, wallet: Wallet, rpc: Arc<RpcClient>) -> Result<Self, SwapError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: JUPITER_V6_URL.to_string(),
            rpc,
            wallet,
            settle_delay: Duration::from_secs(config.settle_delay_secs),
            settle_attempts: config.settle_attempts,
        })
    }

    /// Fetch a quote for the pair. The whole response is handed back to the
    /// swap endpoint verbatim, so it stays untyped.
    async fn quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u32,
    ) -> Result<Value, SwapError> {
        let url = format!(
            "{}/quote?inputMint={input}&outputMint={output}&amount={amount}&slippageBps={slippage_bps}",
            self.base_url,
        );

        debug!(input, output, amount, "Requesting quote");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Aggregator { status, body });
        }

        let quote: Value = response.json().await?;
        if route_missing(&quote) {
            return Err(SwapError::NoRoute {
                input: input.to_string(),
                output: output.to_string(),
            });
        }
        Ok(quote)
    }

    /// Ask the aggregator to build an unsigned transaction for `quote`.
    async fn build_transaction(&self, quote: &Value) -> Result<String, SwapError> {
        let url = format!("{}/swap", self.base_url);
        let payload = json!({
            "quoteResponse": quote,
            "userPublicKey": self.wallet.pubkey(),
            "wrapAndUnwrapSol": true,
        });

        let response = self.http.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Aggregator { status, body });
        }

        let swap: SwapResponse = response.json().await?;
        swap.swap_transaction.ok_or(SwapError::MissingTransaction)
    }
}

#[async_trait]
impl SwapExecutor for AggregatorClient {
    async fn swap(
        &self,
        input_asset: &str,
        output_asset: &str,
        amount: u64,
        max_slippage_bps: u32,
    ) -> Result<String, SwapError> {
        let quote = self
            .quote(input_asset, output_asset, amount, max_slippage_bps)
            .await?;
        let unsigned = self.build_transaction(&quote).await?;
        let signed = self.wallet.sign_transaction(&unsigned)?;
        let signature = self.rpc.send_transaction(&signed).await?;

        info!(
            signature = %signature,
            input = input_asset,
            output = output_asset,
            amount,
            "Swap submitted"
        );
        Ok(signature)
    }

    async fn settle(&self, order_ref: &str, output_asset: &str) -> SettlementStatus {
        tokio::time::sleep(self.settle_delay).await;

        for attempt in 1..=self.settle_attempts {
            match self.rpc.transaction_at(order_ref, "finalized").await {
                Ok(Some(view)) => {
                    if !view.succeeded {
                        warn!(order_ref, "Order landed but failed on chain");
                        return SettlementStatus::Confirmed { received: 0 };
                    }
                    let delta = if output_asset == NATIVE_MINT {
                        view.native_delta(self.wallet.pubkey())
                    } else {
                        view.asset_deltas(self.wallet.pubkey())
                            .get(output_asset)
                            .copied()
                            .unwrap_or(0)
                    };
                    let received = u64::try_from(delta.max(0)).unwrap_or(u64::MAX);
                    return SettlementStatus::Confirmed { received };
                }
                Ok(None) => debug!(order_ref, attempt, "Order not finalized yet"),
                Err(err) => warn!(order_ref, attempt, error = %err, "Settlement poll failed"),
            }
            if attempt < self.settle_attempts {
                tokio::time::sleep(self.settle_delay).await;
            }
        }

        warn!(order_ref, "Order unverified after all settlement polls");
        SettlementStatus::Unverified
    }
}

/// A quote without a route cannot be executed. Unroutable pairs show up
/// both as an `error` field and as an empty route plan.
fn route_missing(quote: &Value) -> bool {
    quote.get("error").is_some()
        || quote
            .get("routePlan")
            .and_then(Value::as_array)
            .map_or(true, |plan| plan.is_empty())
}
