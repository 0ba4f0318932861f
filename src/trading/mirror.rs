//! Mirror engine: turns leader transactions into follower orders.
//!
//! One instance owns everything a trading decision touches: the position
//! store, the risk gate with its cooldown table, and the sell scheduler.
//! Each leader signature flows through fetch, classify, gate, execute and
//! record, and comes out as a [`MirrorOutcome`].

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ActionKind, NATIVE_MINT};
use crate::rpc::LedgerSource;
use crate::store::{PositionStore, StoreError};
use crate::swap::{SettlementStatus, SwapExecutor};
use crate::trading::{classify, MirrorConfig, RiskGate, SellScheduler, StepOutcome};

/// What the engine did with one leader transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Nothing to mirror: no action, unknown signature, or unreadable state.
    Ignored { cause: String },
    /// An action was recognized but a gate held it back.
    Suppressed { asset: String, reason: String },
    /// A buy went through.
    Bought {
        asset: String,
        spent: u64,
        received: u64,
    },
    /// A sell step went through.
    Sold {
        asset: String,
        sold: u64,
        liquidated: bool,
    },
    /// A tracked position turned out to be empty on chain and was dropped.
    Cleaned { asset: String },
    /// The swap could not be executed; no state changed.
    ExecutionFailed { asset: String },
    /// Dry-run mode: the order that would have been sent.
    SkippedDryRun {
        asset: String,
        kind: ActionKind,
        amount: u64,
    },
}

/// One row of a reconcile report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEntry {
    pub asset: String,
    pub stored: u64,
    /// Live on-chain quantity, `None` when the balance fetch failed.
    pub live: Option<u64>,
    pub dropped: bool,
}

/// Mirroring engine state.
pub struct MirrorEngine {
    config: MirrorConfig,
    ledger: Arc<dyn LedgerSource>,
    executor: Arc<dyn SwapExecutor>,
    store: PositionStore,
    gate: RiskGate,
    scheduler: SellScheduler,
    follower: String,
    dry_run: bool,
}

impl MirrorEngine {
    pub fn new(
        config: MirrorConfig,
        ledger: Arc<dyn LedgerSource>,
        executor: Arc<dyn SwapExecutor>,
        store: PositionStore,
        follower: String,
        dry_run: bool,
    ) -> Self {
        let gate = RiskGate::new(config.clone());
        let scheduler = SellScheduler::new(config.sell_schedule.clone());
        Self {
            config,
            ledger,
            executor,
            store,
            gate,
            scheduler,
            follower,
            dry_run,
        }
    }

    /// The engine's view of tracked positions.
    pub fn positions(&self) -> &PositionStore {
        &self.store
    }

    /// Process one leader transaction signature end to end.
    ///
    /// Ledger and execution failures are absorbed into the outcome; only a
    /// store failure is an error, because trading without being able to
    /// record fills must stop.
    pub async fn handle_signature(&mut self, signature: &str) -> Result<MirrorOutcome, StoreError> {
        let trace = Uuid::new_v4();
        debug!(%trace, signature, "Processing leader transaction");

        let view = match self.ledger.transaction(signature).await {
            Ok(Some(view)) => view,
            Ok(None) => {
                debug!(%trace, signature, "Transaction unknown or unreadable");
                return Ok(MirrorOutcome::Ignored {
                    cause: "transaction not found".into(),
                });
            }
            Err(err) => {
                warn!(%trace, signature, error = %err, "Transaction fetch failed");
                return Ok(MirrorOutcome::Ignored {
                    cause: "transaction fetch failed".into(),
                });
            }
        };

        let action = match classify(&view, &self.config.leader, self.config.mirror_sell) {
            Some(action) => action,
            None => {
                debug!(%trace, signature, "No leader action in transaction");
                return Ok(MirrorOutcome::Ignored {
                    cause: "no leader action".into(),
                });
            }
        };

        info!(
            %trace,
            signature,
            kind = action.kind.as_str(),
            asset = %action.asset,
            magnitude = action.magnitude,
            "Leader action detected"
        );

        let outcome = match action.kind {
            ActionKind::Buy => {
                // Sizing follows the leader's native spend, not the token
                // quantity they got for it.
                let spent = view.spent_amount(&self.config.leader).unsigned_abs();
                let spent = u64::try_from(spent).unwrap_or(u64::MAX);
                self.mirror_buy(&action.asset, spent).await?
            }
            ActionKind::Sell => self.mirror_sell(&action.asset).await?,
        };

        info!(%trace, signature, outcome = ?outcome, "Leader transaction handled");
        Ok(outcome)
    }

    async fn mirror_buy(&mut self, asset: &str, leader_spent: u64) -> Result<MirrorOutcome, StoreError> {
        if !self.gate.claim_cooldown(asset) {
            debug!(asset, "Buy suppressed by cooldown");
            return Ok(MirrorOutcome::Suppressed {
                asset: asset.into(),
                reason: "cooldown".into(),
            });
        }

        // Holder lookup is advisory; when it fails the buy proceeds
        // unweighted.
        let holders = match self.ledger.top_holders(asset).await {
            Ok(holders) => holders,
            Err(err) => {
                warn!(asset, error = %err, "Holder lookup failed, proceeding unweighted");
                Vec::new()
            }
        };

        let free_balance = match self.ledger.native_balance(&self.follower).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(asset, error = %err, "Balance fetch failed, skipping buy");
                return Ok(MirrorOutcome::Ignored {
                    cause: "balance unavailable".into(),
                });
            }
        };

        let decision = self
            .gate
            .evaluate_buy(asset, leader_spent, free_balance, &holders);
        if !decision.allowed {
            info!(asset, reason = %decision.reason, "Buy suppressed");
            return Ok(MirrorOutcome::Suppressed {
                asset: asset.into(),
                reason: decision.reason,
            });
        }
        let amount = decision.amount;

        if self.dry_run {
            info!(asset, amount, "Dry run, buy not sent");
            return Ok(MirrorOutcome::SkippedDryRun {
                asset: asset.into(),
                kind: ActionKind::Buy,
                amount,
            });
        }

        let order_ref = match self
            .executor
            .swap(NATIVE_MINT, asset, amount, self.config.slippage_bps)
            .await
        {
            Ok(order_ref) => order_ref,
            Err(err) => {
                warn!(asset, amount, error = %err, "Buy execution failed");
                return Ok(MirrorOutcome::ExecutionFailed { asset: asset.into() });
            }
        };

        let received = match self.executor.settle(&order_ref, asset).await {
            SettlementStatus::Confirmed { received } => received,
            SettlementStatus::Unverified => 0,
        };

        let mut position = self.store.get(asset).cloned().unwrap_or_default();
        if received > 0 {
            position.record_fill(received, amount, &order_ref);
        } else {
            // The spend is known even when the fill is not; the next sell
            // reconciles quantity against the chain.
            position.record_spend(amount, &order_ref);
        }
        self.store.put(asset, position).await?;

        info!(asset, spent = amount, received, order_ref = %order_ref, "Buy mirrored");
        Ok(MirrorOutcome::Bought {
            asset: asset.into(),
            spent: amount,
            received,
        })
    }

    async fn mirror_sell(&mut self, asset: &str) -> Result<MirrorOutcome, StoreError> {
        if !self.gate.claim_cooldown(asset) {
            debug!(asset, "Sell suppressed by cooldown");
            return Ok(MirrorOutcome::Suppressed {
                asset: asset.into(),
                reason: "cooldown".into(),
            });
        }

        let mut position = match self.store.get(asset) {
            Some(position) => position.clone(),
            None => {
                debug!(asset, "Leader sold an asset the follower does not hold");
                return Ok(MirrorOutcome::Ignored {
                    cause: "no position".into(),
                });
            }
        };

        // The chain is authoritative for quantity; the store can lag after
        // unverified settlements or external transfers.
        let live = match self.ledger.token_balance(&self.follower, asset).await {
            Ok(live) => live,
            Err(err) => {
                warn!(asset, error = %err, "Token balance fetch failed, skipping sell");
                return Ok(MirrorOutcome::Ignored {
                    cause: "balance unavailable".into(),
                });
            }
        };

        if live == 0 {
            info!(asset, "Position is empty on chain, dropping it");
            self.store.remove(asset).await?;
            return Ok(MirrorOutcome::Cleaned { asset: asset.into() });
        }

        if position.reconcile(live) {
            info!(asset, quantity = live, "Position reconciled to live balance");
        }

        let amount = self.scheduler.sale_amount(position.quantity, position.sell_step);
        if amount == 0 {
            info!(asset, step = position.sell_step, "Sale amount is zero, nothing to sell");
            return Ok(MirrorOutcome::Suppressed {
                asset: asset.into(),
                reason: "zero sale amount".into(),
            });
        }

        if self.dry_run {
            info!(asset, amount, "Dry run, sell not sent");
            return Ok(MirrorOutcome::SkippedDryRun {
                asset: asset.into(),
                kind: ActionKind::Sell,
                amount,
            });
        }

        let order_ref = match self
            .executor
            .swap(asset, NATIVE_MINT, amount, self.config.slippage_bps)
            .await
        {
            Ok(order_ref) => order_ref,
            Err(err) => {
                warn!(asset, amount, error = %err, "Sell execution failed");
                return Ok(MirrorOutcome::ExecutionFailed { asset: asset.into() });
            }
        };

        match self
            .scheduler
            .after_sale(position.quantity, position.sell_step, amount)
        {
            StepOutcome::Liquidated => {
                self.store.remove(asset).await?;
                info!(asset, sold = amount, order_ref = %order_ref, "Position liquidated");
                Ok(MirrorOutcome::Sold {
                    asset: asset.into(),
                    sold: amount,
                    liquidated: true,
                })
            }
            StepOutcome::Holding { quantity, step } => {
                position.record_sale(amount, step, &order_ref);
                debug_assert_eq!(position.quantity, quantity);
                self.store.put(asset, position).await?;
                info!(asset, sold = amount, remaining = quantity, step, order_ref = %order_ref, "Sell step mirrored");
                Ok(MirrorOutcome::Sold {
                    asset: asset.into(),
                    sold: amount,
                    liquidated: false,
                })
            }
        }
    }
}

/// Reconcile every stored position against live balances, dropping the
/// empty ones. Assets whose balance cannot be fetched are left untouched.
pub async fn reconcile_positions(
    store: &mut PositionStore,
    ledger: &dyn LedgerSource,
    follower: &str,
) -> Result<Vec<ReconcileEntry>, StoreError> {
    let mut report = Vec::new();

    for asset in store.assets() {
        let stored = store.get(&asset).map_or(0, |p| p.quantity);
        let live = match ledger.token_balance(follower, &asset).await {
            Ok(live) => live,
            Err(err) => {
                warn!(asset = %asset, error = %err, "Balance fetch failed, leaving position untouched");
                report.push(ReconcileEntry {
                    asset,
                    stored,
                    live: None,
                    dropped: false,
                });
                continue;
            }
        };

        if live == 0 {
            store.remove(&asset).await?;
            report.push(ReconcileEntry {
                asset,
                stored,
                live: Some(0),
                dropped: true,
            });
        } else {
            let mut position = store.get(&asset).cloned().unwrap_or_default();
            if position.reconcile(live) {
                store.put(&asset, position).await?;
            }
            report.push(ReconcileEntry {
                asset,
                stored,
                live: Some(live),
                dropped: false,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::models::{AccountKey, Position, TokenBalance, TransactionView};
    use crate::rpc::RpcError;
    use crate::swap::SwapError;

    const LEADER: &str = "LeaderWallet11111111111111111111111111111111";
    const FOLLOWER: &str = "FollowerWallet111111111111111111111111111111";
    const MINT: &str = "MintX1111111111111111111111111111111111111";

    #[derive(Default)]
    struct ScriptedLedger {
        views: HashMap<String, TransactionView>,
        native: HashMap<String, u64>,
        tokens: HashMap<(String, String), u64>,
        holders: HashMap<String, Vec<String>>,
        fail_holders: bool,
    }

    #[async_trait]
    impl LedgerSource for ScriptedLedger {
        async fn transaction(&self, signature: &str) -> Result<Option<TransactionView>, RpcError> {
            Ok(self.views.get(signature).cloned())
        }

        async fn native_balance(&self, account: &str) -> Result<u64, RpcError> {
            self.native
                .get(account)
                .copied()
                .ok_or(RpcError::MissingResult { method: "getBalance" })
        }

        async fn token_balance(&self, owner: &str, asset: &str) -> Result<u64, RpcError> {
            self.tokens
                .get(&(owner.to_string(), asset.to_string()))
                .copied()
                .ok_or(RpcError::MissingResult {
                    method: "getTokenAccountsByOwner",
                })
        }

        async fn top_holders(&self, asset: &str) -> Result<Vec<String>, RpcError> {
            if self.fail_holders {
                return Err(RpcError::MissingResult {
                    method: "getTokenLargestAccounts",
                });
            }
            Ok(self.holders.get(asset).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct ScriptedExecutor {
        orders: Mutex<Vec<(String, String, u64)>>,
        fail_swap: bool,
        unverified: bool,
        received: u64,
    }

    #[async_trait]
    impl SwapExecutor for ScriptedExecutor {
        async fn swap(
            &self,
            input_asset: &str,
            output_asset: &str,
            amount: u64,
            _max_slippage_bps: u32,
        ) -> Result<String, SwapError> {
            if self.fail_swap {
                return Err(SwapError::MissingTransaction);
            }
            let mut orders = self.orders.lock().unwrap();
            orders.push((input_asset.to_string(), output_asset.to_string(), amount));
            Ok(format!("order-{}", orders.len()))
        }

        async fn settle(&self, _order_ref: &str, _output_asset: &str) -> SettlementStatus {
            if self.unverified {
                SettlementStatus::Unverified
            } else {
                SettlementStatus::Confirmed {
                    received: self.received,
                }
            }
        }
    }

    /// Leader spends 1 SOL and receives 500 base units of the asset.
    fn buy_view(signature: &str) -> TransactionView {
        TransactionView {
            signature: signature.to_string(),
            succeeded: true,
            accounts: vec![
                AccountKey {
                    pubkey: LEADER.to_string(),
                    signer: true,
                },
                AccountKey {
                    pubkey: "TokenAcct".to_string(),
                    signer: false,
                },
            ],
            pre_native: vec![5_000_000_000, 0],
            post_native: vec![4_000_000_000, 0],
            pre_tokens: vec![],
            post_tokens: vec![TokenBalance {
                mint: MINT.to_string(),
                owner: LEADER.to_string(),
                amount: 500,
            }],
        }
    }

    /// Leader dumps the asset for native.
    fn sell_view(signature: &str) -> TransactionView {
        TransactionView {
            signature: signature.to_string(),
            succeeded: true,
            accounts: vec![
                AccountKey {
                    pubkey: LEADER.to_string(),
                    signer: true,
                },
                AccountKey {
                    pubkey: "TokenAcct".to_string(),
                    signer: false,
                },
            ],
            pre_native: vec![1_000_000_000, 0],
            post_native: vec![1_400_000_000, 0],
            pre_tokens: vec![TokenBalance {
                mint: MINT.to_string(),
                owner: LEADER.to_string(),
                amount: 800,
            }],
            post_tokens: vec![TokenBalance {
                mint: MINT.to_string(),
                owner: LEADER.to_string(),
                amount: 0,
            }],
        }
    }

    fn test_config() -> MirrorConfig {
        MirrorConfig {
            leader: LEADER.to_string(),
            ..MirrorConfig::default()
        }
    }

    async fn empty_store(dir: &tempfile::TempDir) -> PositionStore {
        PositionStore::load(dir.path().join("positions.json"))
            .await
            .unwrap()
    }

    fn build_engine(
        config: MirrorConfig,
        ledger: ScriptedLedger,
        executor: Arc<ScriptedExecutor>,
        store: PositionStore,
        dry_run: bool,
    ) -> MirrorEngine {
        MirrorEngine::new(
            config,
            Arc::new(ledger),
            executor,
            store,
            FOLLOWER.to_string(),
            dry_run,
        )
    }

    #[tokio::test]
    async fn test_buy_is_mirrored_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        let executor = Arc::new(ScriptedExecutor {
            received: 480,
            ..ScriptedExecutor::default()
        });

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        // 1% of the leader's 1 SOL spend.
        assert_eq!(
            outcome,
            MirrorOutcome::Bought {
                asset: MINT.to_string(),
                spent: 10_000_000,
                received: 480,
            }
        );

        let orders = executor.orders.lock().unwrap();
        assert_eq!(
            orders.as_slice(),
            &[(NATIVE_MINT.to_string(), MINT.to_string(), 10_000_000)]
        );

        let position = engine.positions().get(MINT).unwrap();
        assert_eq!(position.quantity, 480);
        assert_eq!(position.cost_basis, 10_000_000);
        assert_eq!(position.sell_step, 0);
    }

    #[tokio::test]
    async fn test_second_buy_within_cooldown_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-1".to_string(), buy_view("sig-1"));
        ledger.views.insert("sig-2".to_string(), buy_view("sig-2"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        let executor = Arc::new(ScriptedExecutor::default());

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let first = engine.handle_signature("sig-1").await.unwrap();
        assert!(matches!(first, MirrorOutcome::Bought { .. }));

        let second = engine.handle_signature("sig-2").await.unwrap();
        assert_eq!(
            second,
            MirrorOutcome::Suppressed {
                asset: MINT.to_string(),
                reason: "cooldown".to_string(),
            }
        );

        assert_eq!(executor.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_without_balance_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        // No native balance entry: the fetch fails.
        let executor = Arc::new(ScriptedExecutor::default());

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Ignored {
                cause: "balance unavailable".to_string(),
            }
        );
        assert!(executor.orders.lock().unwrap().is_empty());
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_swap_failure_leaves_no_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        let executor = Arc::new(ScriptedExecutor {
            fail_swap: true,
            ..ScriptedExecutor::default()
        });

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor, store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::ExecutionFailed {
                asset: MINT.to_string(),
            }
        );
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_unverified_settlement_records_spend_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        let executor = Arc::new(ScriptedExecutor {
            unverified: true,
            ..ScriptedExecutor::default()
        });

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor, store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Bought {
                asset: MINT.to_string(),
                spent: 10_000_000,
                received: 0,
            }
        );

        let position = engine.positions().get(MINT).unwrap();
        assert_eq!(position.quantity, 0);
        assert_eq!(position.cost_basis, 10_000_000);
    }

    #[tokio::test]
    async fn test_holder_lookup_failure_is_fail_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        ledger.fail_holders = true;
        let executor = Arc::new(ScriptedExecutor {
            received: 480,
            ..ScriptedExecutor::default()
        });

        let store = empty_store(&dir).await;
        let mut config = test_config();
        config.priority_holders = vec!["Whale".to_string()];
        let mut engine = build_engine(config, ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        // Unweighted size: the lookup failure must not block the trade.
        assert_eq!(
            outcome,
            MirrorOutcome::Bought {
                asset: MINT.to_string(),
                spent: 10_000_000,
                received: 480,
            }
        );
    }

    #[tokio::test]
    async fn test_priority_holder_boosts_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        ledger
            .holders
            .insert(MINT.to_string(), vec!["Whale".to_string()]);
        let executor = Arc::new(ScriptedExecutor {
            received: 960,
            ..ScriptedExecutor::default()
        });

        let store = empty_store(&dir).await;
        let mut config = test_config();
        config.priority_holders = vec!["Whale".to_string()];
        config.priority_weight = dec!(2);
        let mut engine = build_engine(config, ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Bought {
                asset: MINT.to_string(),
                spent: 20_000_000,
                received: 960,
            }
        );
    }

    #[tokio::test]
    async fn test_denied_holder_suppresses_buy() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        ledger
            .holders
            .insert(MINT.to_string(), vec!["Rug".to_string()]);
        let executor = Arc::new(ScriptedExecutor::default());

        let store = empty_store(&dir).await;
        let mut config = test_config();
        config.denied_holders = vec!["Rug".to_string()];
        let mut engine = build_engine(config, ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert!(matches!(outcome, MirrorOutcome::Suppressed { .. }));
        assert!(executor.orders.lock().unwrap().is_empty());
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_sell_without_position_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger
            .views
            .insert("sig-sell".to_string(), sell_view("sig-sell"));
        let executor = Arc::new(ScriptedExecutor::default());

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-sell").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Ignored {
                cause: "no position".to_string(),
            }
        );
        assert!(executor.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sell_with_empty_chain_balance_cleans_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger
            .views
            .insert("sig-sell".to_string(), sell_view("sig-sell"));
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), MINT.to_string()), 0);
        let executor = Arc::new(ScriptedExecutor::default());

        let mut store = empty_store(&dir).await;
        let mut position = Position::default();
        position.record_fill(1_000, 10_000_000, "order-0");
        store.put(MINT, position).await.unwrap();

        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-sell").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Cleaned {
                asset: MINT.to_string(),
            }
        );
        assert!(engine.positions().is_empty());
        assert!(executor.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staged_sell_advances_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger
            .views
            .insert("sig-sell".to_string(), sell_view("sig-sell"));
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), MINT.to_string()), 1_000);
        let executor = Arc::new(ScriptedExecutor::default());

        let mut store = empty_store(&dir).await;
        let mut position = Position::default();
        position.record_fill(1_000, 10_000_000, "order-0");
        store.put(MINT, position).await.unwrap();

        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, false);

        let outcome = engine.handle_signature("sig-sell").await.unwrap();
        // First schedule step sells a quarter.
        assert_eq!(
            outcome,
            MirrorOutcome::Sold {
                asset: MINT.to_string(),
                sold: 250,
                liquidated: false,
            }
        );

        let orders = executor.orders.lock().unwrap();
        assert_eq!(
            orders.as_slice(),
            &[(MINT.to_string(), NATIVE_MINT.to_string(), 250)]
        );

        let position = engine.positions().get(MINT).unwrap();
        assert_eq!(position.quantity, 750);
        assert_eq!(position.sell_step, 1);
    }

    #[tokio::test]
    async fn test_sell_reconciles_to_live_balance_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger
            .views
            .insert("sig-sell".to_string(), sell_view("sig-sell"));
        // The chain says 800, the store says 1000.
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), MINT.to_string()), 800);
        let executor = Arc::new(ScriptedExecutor::default());

        let mut store = empty_store(&dir).await;
        let mut position = Position::default();
        position.record_fill(1_000, 10_000_000, "order-0");
        store.put(MINT, position).await.unwrap();

        let mut engine = build_engine(test_config(), ledger, executor, store, false);

        let outcome = engine.handle_signature("sig-sell").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Sold {
                asset: MINT.to_string(),
                sold: 200,
                liquidated: false,
            }
        );

        let position = engine.positions().get(MINT).unwrap();
        assert_eq!(position.quantity, 600);
    }

    #[tokio::test]
    async fn test_final_step_liquidates_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger
            .views
            .insert("sig-sell".to_string(), sell_view("sig-sell"));
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), MINT.to_string()), 100);
        let executor = Arc::new(ScriptedExecutor::default());

        let mut store = empty_store(&dir).await;
        let mut position = Position::default();
        position.record_fill(100, 1_000_000, "order-0");
        position.sell_step = 4; // last step of the default schedule
        store.put(MINT, position).await.unwrap();

        let mut engine = build_engine(test_config(), ledger, executor, store, false);

        let outcome = engine.handle_signature("sig-sell").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::Sold {
                asset: MINT.to_string(),
                sold: 100,
                liquidated: true,
            }
        );
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ScriptedLedger::default();
        ledger.views.insert("sig-buy".to_string(), buy_view("sig-buy"));
        ledger.native.insert(FOLLOWER.to_string(), 500_000_000);
        let executor = Arc::new(ScriptedExecutor::default());

        let store = empty_store(&dir).await;
        let mut engine = build_engine(test_config(), ledger, executor.clone(), store, true);

        let outcome = engine.handle_signature("sig-buy").await.unwrap();
        assert_eq!(
            outcome,
            MirrorOutcome::SkippedDryRun {
                asset: MINT.to_string(),
                kind: ActionKind::Buy,
                amount: 10_000_000,
            }
        );
        assert!(executor.orders.lock().unwrap().is_empty());
        assert!(engine.positions().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_drops_empty_and_adjusts_drifted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = empty_store(&dir).await;

        let mut gone = Position::default();
        gone.record_fill(1_000, 5_000_000, "order-1");
        store.put("MintGone", gone).await.unwrap();

        let mut drifted = Position::default();
        drifted.record_fill(1_000, 5_000_000, "order-2");
        store.put("MintDrift", drifted).await.unwrap();

        let mut ledger = ScriptedLedger::default();
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), "MintGone".to_string()), 0);
        ledger
            .tokens
            .insert((FOLLOWER.to_string(), "MintDrift".to_string()), 700);

        let report = reconcile_positions(&mut store, &ledger, FOLLOWER)
            .await
            .unwrap();

        assert_eq!(report.len(), 2);
        let gone_row = report.iter().find(|r| r.asset == "MintGone").unwrap();
        assert!(gone_row.dropped);
        let drift_row = report.iter().find(|r| r.asset == "MintDrift").unwrap();
        assert!(!drift_row.dropped);
        assert_eq!(drift_row.live, Some(700));

        assert!(store.get("MintGone").is_none());
        assert_eq!(store.get("MintDrift").unwrap().quantity, 700);
    }
}
