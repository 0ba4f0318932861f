//! Classified leader actions derived from balance deltas.

use serde::{Deserialize, Serialize};

/// Direction of a classified leader trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Buy,
    Sell,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Buy => "BUY",
            ActionKind::Sell => "SELL",
        }
    }
}

/// A leader trade distilled from one confirmed transaction.
///
/// Ephemeral: produced by the classifier, consumed by the orchestrator,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAction {
    pub kind: ActionKind,

    /// Mint of the non-reserve asset entered or exited
    pub asset: String,

    /// Absolute size of the leader's asset delta in base units
    pub magnitude: u64,
}
