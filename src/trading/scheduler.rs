//! Staged liquidation schedule.
//!
//! A position walks through the schedule one leader sell signal at a time:
//! each step sells a fraction of the quantity remaining at that moment.
//! The orchestrator does the IO around these transitions; everything here
//! is pure and deterministic.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Where a position lands after a completed sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Position continues at the next step with the remaining quantity
    Holding { quantity: u64, step: usize },
    /// Position fully unwound; remove it from the store
    Liquidated,
}

/// Walks a position through fractional sell-offs until liquidation.
#[derive(Debug, Clone)]
pub struct SellScheduler {
    schedule: Vec<Decimal>,
}

impl SellScheduler {
    pub fn new(schedule: Vec<Decimal>) -> Self {
        Self { schedule }
    }

    /// Base units to sell at `step` given the quantity remaining.
    /// Steps past the schedule return zero; such positions were already
    /// liquidated and only show up through hand-edited state files.
    pub fn sale_amount(&self, quantity: u64, step: usize) -> u64 {
        let Some(fraction) = self.schedule.get(step) else {
            return 0;
        };
        (Decimal::from(quantity) * fraction)
            .floor()
            .to_u64()
            .unwrap_or(0)
            .min(quantity)
    }

    /// State transition after `sold` units were confirmed sold at `step`.
    pub fn after_sale(&self, quantity: u64, step: usize, sold: u64) -> StepOutcome {
        let remaining = quantity.saturating_sub(sold);
        let next = step + 1;
        if remaining == 0 || next >= self.schedule.len() {
            StepOutcome::Liquidated
        } else {
            StepOutcome::Holding {
                quantity: remaining,
                step: next,
            }
        }
    }
}
