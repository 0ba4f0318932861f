//! JSON-RPC wire types.
//!
//! Everything here mirrors the node's response shapes; the only consumer is
//! `rpc::client`, which normalizes into domain views at the boundary so the
//! rest of the crate never touches raw JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{AccountKey, TokenBalance, TransactionView};

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct RpcEnvelope<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// Responses that wrap their payload in `{ context, value }`.
#[derive(Debug, Deserialize)]
pub(crate) struct WithContext<T> {
    pub value: T,
}

/// `getTransaction` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionResult {
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionMeta {
    /// Null on success, an error object on failure
    #[serde(default)]
    pub err: Option<Value>,

    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,

    #[serde(default)]
    pub pre_token_balances: Vec<WireTokenBalance>,
    #[serde(default)]
    pub post_token_balances: Vec<WireTokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionBody {
    pub message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionMessage {
    #[serde(default)]
    pub account_keys: Vec<WireAccountKey>,
    #[serde(default)]
    pub header: MessageHeader,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageHeader {
    #[serde(default)]
    pub num_required_signatures: usize,
}

/// Account keys arrive either as parsed objects with signer flags or as
/// bare strings (raw encodings). The shape is resolved here, exactly once;
/// for bare strings the message header says how many leading keys signed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireAccountKey {
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
    },
    Plain(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTokenBalance {
    pub mint: String,
    /// Absent for token programs that do not report the owner
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: WireTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTokenAmount {
    /// Base units as a decimal string
    pub amount: String,
}

/// One entry of `getTokenAccountsByOwner` with `jsonParsed` encoding.
#[derive(Debug, Deserialize)]
pub(crate) struct KeyedTokenAccount {
    pub account: ParsedAccount,
}

impl KeyedTokenAccount {
    /// Base-unit balance of the account, zero when unparsable.
    pub(crate) fn token_amount(&self) -> u64 {
        self.account
            .data
            .parsed
            .info
            .token_amount
            .amount
            .parse()
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParsedAccount {
    pub data: ParsedAccountData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParsedAccountData {
    pub parsed: ParsedTokenData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParsedTokenData {
    pub info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ParsedTokenInfo {
    pub token_amount: WireTokenAmount,
}

/// One entry of `getTokenLargestAccounts`.
#[derive(Debug, Deserialize)]
pub(crate) struct LargestAccount {
    pub address: String,
}

/// One entry of `getMultipleAccounts`. The data shape depends on whether
/// the node could parse the account, so the owner is dug out of the raw
/// value instead of a fixed struct.
#[derive(Debug, Deserialize)]
pub(crate) struct MultiAccount {
    pub data: Value,
}

impl MultiAccount {
    pub(crate) fn token_owner(&self) -> Option<String> {
        self.data
            .pointer("/parsed/info/owner")
            .and_then(Value::as_str)
            .map(String::from)
    }
}

/// One entry of the holder indexer response.
#[derive(Debug, Deserialize)]
pub(crate) struct HolderEntry {
    #[serde(default)]
    pub owner: Option<String>,
}

impl TransactionResult {
    /// Collapse the wire shape into the typed view. Returns `None` when the
    /// ledger-state metadata is missing; downstream treats that as no
    /// action.
    pub(crate) fn into_view(self, signature: &str) -> Option<TransactionView> {
        let meta = self.meta?;
        let leading_signers = self.transaction.message.header.num_required_signatures;

        let accounts = self
            .transaction
            .message
            .account_keys
            .into_iter()
            .enumerate()
            .map(|(index, key)| match key {
                WireAccountKey::Parsed { pubkey, signer } => AccountKey { pubkey, signer },
                WireAccountKey::Plain(pubkey) => AccountKey {
                    pubkey,
                    signer: index < leading_signers,
                },
            })
            .collect();

        Some(TransactionView {
            signature: signature.to_string(),
            succeeded: meta.err.is_none(),
            accounts,
            pre_native: meta.pre_balances,
            post_native: meta.post_balances,
            pre_tokens: token_balances(meta.pre_token_balances),
            post_tokens: token_balances(meta.post_token_balances),
        })
    }
}

fn token_balances(entries: Vec<WireTokenBalance>) -> Vec<TokenBalance> {
    entries
        .into_iter()
        .map(|entry| TokenBalance {
            mint: entry.mint,
            owner: entry.owner.unwrap_or_default(),
            amount: entry.ui_token_amount.amount.parse().unwrap_or(0),
        })
        .collect()
}
