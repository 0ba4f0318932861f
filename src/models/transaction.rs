//! Normalized view of a confirmed ledger transaction.
//!
//! The raw JSON-RPC payload is parsed exactly once (in `rpc::types`) into
//! this struct; every downstream decision works on typed data. Balance
//! deltas are computed fresh per transaction and never persisted.

use std::collections::BTreeMap;

/// Mint address of wrapped native SOL. Spends routed through token accounts
/// show up under this mint instead of the native balance.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Base units (lamports) per whole native token.
pub const UNITS_PER_NATIVE: u64 = 1_000_000_000;

/// An account referenced by a transaction's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub pubkey: String,
    pub signer: bool,
}

/// One token balance entry (pre or post state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    /// Token mint address
    pub mint: String,

    /// Wallet that owns the token account
    pub owner: String,

    /// Balance in base units
    pub amount: u64,
}

/// A confirmed transaction with its balance snapshots.
#[derive(Debug, Clone)]
pub struct TransactionView {
    pub signature: String,

    /// False when the transaction executed but failed
    pub succeeded: bool,

    pub accounts: Vec<AccountKey>,

    /// Native balances per account index, before and after execution
    pub pre_native: Vec<u64>,
    pub post_native: Vec<u64>,

    /// Token balances touched by the transaction, before and after
    pub pre_tokens: Vec<TokenBalance>,
    pub post_tokens: Vec<TokenBalance>,
}

impl TransactionView {
    /// Whether `account` signed this transaction.
    pub fn is_signer(&self, account: &str) -> bool {
        self.accounts
            .iter()
            .any(|key| key.signer && key.pubkey == account)
    }

    fn account_index(&self, account: &str) -> Option<usize> {
        self.accounts.iter().position(|key| key.pubkey == account)
    }

    /// Net native balance change for `account` in base units.
    /// Negative means the account spent; zero when the account is absent.
    pub fn native_delta(&self, account: &str) -> i128 {
        let Some(index) = self.account_index(account) else {
            return 0;
        };
        let pre = self.pre_native.get(index).copied().unwrap_or(0);
        let post = self.post_native.get(index).copied().unwrap_or(0);
        post as i128 - pre as i128
    }

    /// Net token balance change per mint for token accounts owned by
    /// `account`, summed across sub-accounts of the same mint. Mints whose
    /// net change is zero are omitted. The map's deterministic order gives
    /// downstream tie-breaks a stable answer.
    pub fn asset_deltas(&self, account: &str) -> BTreeMap<String, i128> {
        let mut deltas: BTreeMap<String, i128> = BTreeMap::new();
        for balance in self.pre_tokens.iter().filter(|b| b.owner == account) {
            *deltas.entry(balance.mint.clone()).or_insert(0) -= balance.amount as i128;
        }
        for balance in self.post_tokens.iter().filter(|b| b.owner == account) {
            *deltas.entry(balance.mint.clone()).or_insert(0) += balance.amount as i128;
        }
        deltas.retain(|_, delta| *delta != 0);
        deltas
    }

    /// Reserve-asset outflow for `account`: the native delta when negative,
    /// otherwise the wrapped-native delta when negative, otherwise zero.
    pub fn spent_amount(&self, account: &str) -> i128 {
        let native = self.native_delta(account);
        if native < 0 {
            return native;
        }
        let wrapped = self
            .asset_deltas(account)
            .get(NATIVE_MINT)
            .copied()
            .unwrap_or(0);
        if wrapped < 0 {
            wrapped
        } else {
            0
        }
    }
}
