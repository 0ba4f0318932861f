//! Trading logic: classification, gating, scheduling, mirroring.

mod classifier;
mod config;
mod mirror;
mod risk;
mod scheduler;

pub use classifier::classify;
pub use config::MirrorConfig;
pub use mirror::{reconcile_positions, MirrorEngine, MirrorOutcome, ReconcileEntry};
pub use risk::{GateDecision, RiskGate};
pub use scheduler::{SellScheduler, StepOutcome};
