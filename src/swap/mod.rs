//! Swap execution: the follower wallet and the aggregator client.

mod client;
mod wallet;

use async_trait::async_trait;
use thiserror::Error;

pub use client::AggregatorClient;
pub use wallet::{Wallet, WalletError};

use crate::rpc::RpcError;

/// Errors raised while building or submitting a swap.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no route from {input} to {output}")]
    NoRoute { input: String, output: String },

    #[error("aggregator returned {status}: {body}")]
    Aggregator {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("aggregator response had no transaction")]
    MissingTransaction,

    #[error("signing failed: {0}")]
    Wallet(#[from] WalletError),

    #[error("submission failed: {0}")]
    Rpc(#[from] RpcError),
}

/// Result of waiting for a submitted order to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    /// The order finalized; `received` is what the follower gained in
    /// base units of the output asset.
    Confirmed { received: u64 },
    /// The order could not be confirmed in time. The spend is known, the
    /// proceeds are not.
    Unverified,
}

/// Executes swaps on behalf of the follower. The live implementation is
/// [`AggregatorClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Swap `amount` base units of `input_asset` into `output_asset`.
    /// Returns an order reference, the submitted transaction signature.
    async fn swap(
        &self,
        input_asset: &str,
        output_asset: &str,
        amount: u64,
        max_slippage_bps: u32,
    ) -> Result<String, SwapError>;

    /// Wait for `order_ref` to land and report what the follower received.
    async fn settle(&self, order_ref: &str, output_asset: &str) -> SettlementStatus;
}
