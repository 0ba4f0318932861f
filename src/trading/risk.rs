//! Sizing and gating of mirrored orders.
//!
//! Rules run in order: per-asset cooldown, ratio sizing with the priority
//! boost, then the hard caps. The caps always win, so the final amount
//! never exceeds the per-trade limit or the balance left above the reserve.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use super::MirrorConfig;

/// Result of gate evaluation for one action.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub allowed: bool,
    pub amount: u64,
    pub reason: String,
}

impl GateDecision {
    pub fn allow(amount: u64, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            amount,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            amount: 0,
            reason: reason.into(),
        }
    }
}

/// Applies cooldown, ratio sizing and holder-list adjustment.
///
/// Owns the in-memory cooldown table; nothing here is persisted, so a
/// restart starts with a clean slate.
pub struct RiskGate {
    config: MirrorConfig,
    last_action_at: HashMap<String, Instant>,
}

impl RiskGate {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            last_action_at: HashMap::new(),
        }
    }

    /// Cooldown check for `asset`. Passing stamps the table, so an attempt
    /// counts as the asset's last action even when sizing later denies.
    pub fn claim_cooldown(&mut self, asset: &str) -> bool {
        self.claim_cooldown_at(asset, Instant::now())
    }

    fn claim_cooldown_at(&mut self, asset: &str, now: Instant) -> bool {
        let window = Duration::from_secs(self.config.cooldown_secs);
        if let Some(last) = self.last_action_at.get(asset) {
            if now.duration_since(*last) < window {
                debug!(asset, "Cooldown window still open");
                return false;
            }
        }
        self.last_action_at.insert(asset.to_string(), now);
        true
    }

    /// Size and gate a mirrored buy.
    ///
    /// `leader_spent` is the leader's reserve outflow in base units;
    /// `free_balance` the follower's current native balance. `holders` is
    /// the asset's current top-holder set; an empty slice leaves sizing
    /// unmodified (holder lookup is fail-open).
    pub fn evaluate_buy(
        &self,
        asset: &str,
        leader_spent: u64,
        free_balance: u64,
        holders: &[String],
    ) -> GateDecision {
        // Deny-list membership blocks the buy no matter what sizing says.
        if let Some(denied) = holders
            .iter()
            .find(|h| self.config.denied_holders.contains(h))
        {
            return GateDecision::deny(format!("Deny-listed holder {denied} among {asset} holders"));
        }

        let mut amount = (Decimal::from(leader_spent) * self.config.follow_ratio)
            .floor()
            .to_u64()
            .unwrap_or(0);

        let prioritized = holders
            .iter()
            .any(|h| self.config.priority_holders.contains(h));
        if prioritized {
            amount = (Decimal::from(amount) * self.config.priority_weight)
                .floor()
                .to_u64()
                .unwrap_or(u64::MAX);
        }

        // Hard caps apply last: per-trade limit, then whatever the balance
        // allows above the reserve.
        amount = amount.min(self.config.max_per_trade);
        let spendable = free_balance.saturating_sub(self.config.reserve_min);
        amount = amount.min(spendable);

        if amount == 0 {
            return GateDecision::deny("Sized to zero after caps and reserve");
        }

        if prioritized {
            GateDecision::allow(amount, "Priority holder present, size boosted")
        } else {
            GateDecision::allow(amount, "Sizing constraints met")
        }
    }
}
