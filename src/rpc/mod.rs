//! Ledger access: JSON-RPC client, pubsub log stream, wire types.

mod client;
mod stream;
pub(crate) mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::TransactionView;

pub use client::RpcClient;
pub use stream::{ConnectionState, LogStream};

/// Errors raised by the ledger boundary.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("{method} returned no result")]
    MissingResult { method: &'static str },
}

/// Read-only view of the ledger. The live implementation is [`RpcClient`];
/// tests substitute scripted fakes.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Fetch and normalize a confirmed transaction. `Ok(None)` when the
    /// node does not know the signature or returned no usable state.
    async fn transaction(&self, signature: &str) -> Result<Option<TransactionView>, RpcError>;

    /// Native balance of `account` in base units.
    async fn native_balance(&self, account: &str) -> Result<u64, RpcError>;

    /// Total balance of `asset` held by `owner` across its token accounts.
    async fn token_balance(&self, owner: &str, asset: &str) -> Result<u64, RpcError>;

    /// Wallets currently holding the largest amounts of `asset`.
    /// Best effort; an empty list means "unknown".
    async fn top_holders(&self, asset: &str) -> Result<Vec<String>, RpcError>;
}
