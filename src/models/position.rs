//! Position model for follower holdings in mirrored assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Follower holding for one asset, persisted across restarts.
///
/// A position exists while `quantity > 0` or while a buy has been ordered
/// whose receipt is not yet confirmed (spend recorded, quantity still zero
/// until reconciled against the live balance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Base units currently held. Overwritten from the live on-chain
    /// balance before every sell decision.
    pub quantity: u64,

    /// Cumulative native base units spent acquiring the holding
    #[serde(default)]
    pub cost_basis: u64,

    /// Next index into the liquidation schedule; strictly increasing
    #[serde(default)]
    pub sell_step: usize,

    /// Most recent order signature, kept for audit
    #[serde(default)]
    pub last_order_ref: Option<String>,

    /// When the position was first opened
    #[serde(default = "Utc::now")]
    pub opened_at: DateTime<Utc>,

    /// Last mutation time
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Position {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            quantity: 0,
            cost_basis: 0,
            sell_step: 0,
            last_order_ref: None,
            opened_at: now,
            updated_at: now,
        }
    }
}

impl Position {
    /// Fold a confirmed buy fill into the position.
    pub fn record_fill(&mut self, received: u64, spent: u64, order_ref: impl Into<String>) {
        self.quantity = self.quantity.saturating_add(received);
        self.cost_basis = self.cost_basis.saturating_add(spent);
        self.last_order_ref = Some(order_ref.into());
        self.updated_at = Utc::now();
    }

    /// Record spend for an order whose receipt could not be confirmed.
    /// Quantity is left alone; the next live-balance check trues it up.
    pub fn record_spend(&mut self, spent: u64, order_ref: impl Into<String>) {
        self.cost_basis = self.cost_basis.saturating_add(spent);
        self.last_order_ref = Some(order_ref.into());
        self.updated_at = Utc::now();
    }

    /// Apply a completed partial sale.
    pub fn record_sale(&mut self, sold: u64, next_step: usize, order_ref: impl Into<String>) {
        self.quantity = self.quantity.saturating_sub(sold);
        self.sell_step = next_step;
        self.last_order_ref = Some(order_ref.into());
        self.updated_at = Utc::now();
    }

    /// Overwrite quantity from the live on-chain balance. Returns true when
    /// the stored quantity drifted.
    pub fn reconcile(&mut self, live_quantity: u64) -> bool {
        if self.quantity == live_quantity {
            return false;
        }
        self.quantity = live_quantity;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fill_accumulates() {
        let mut pos = Position::default();
        pos.record_fill(500, 10_000_000, "sig-1");
        pos.record_fill(250, 5_000_000, "sig-2");

        assert_eq!(pos.quantity, 750);
        assert_eq!(pos.cost_basis, 15_000_000);
        assert_eq!(pos.last_order_ref.as_deref(), Some("sig-2"));
    }

    #[test]
    fn test_record_spend_keeps_quantity() {
        let mut pos = Position::default();
        pos.record_spend(10_000_000, "sig-1");

        assert_eq!(pos.quantity, 0);
        assert_eq!(pos.cost_basis, 10_000_000);
    }

    #[test]
    fn test_record_sale_reduces() {
        let mut pos = Position {
            quantity: 1000,
            ..Default::default()
        };
        pos.record_sale(250, 1, "sig-sell");

        assert_eq!(pos.quantity, 750);
        assert_eq!(pos.sell_step, 1);
    }

    #[test]
    fn test_reconcile_reports_drift() {
        let mut pos = Position {
            quantity: 1000,
            ..Default::default()
        };
        assert!(!pos.reconcile(1000));
        assert!(pos.reconcile(400));
        assert_eq!(pos.quantity, 400);
    }

    #[test]
    fn test_serde_defaults_for_missing_fields() {
        // Files written by earlier versions carry only the core fields.
        let json = r#"{"quantity": 10, "cost_basis": 20}"#;
        let pos: Position = serde_json::from_str(json).unwrap();

        assert_eq!(pos.quantity, 10);
        assert_eq!(pos.cost_basis, 20);
        assert_eq!(pos.sell_step, 0);
        assert!(pos.last_order_ref.is_none());
    }
}
