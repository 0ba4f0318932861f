//! Domain models: normalized transactions, classified actions, positions.

mod action;
mod position;
mod transaction;

pub use action::{ActionKind, LeaderAction};
pub use position::Position;
pub use transaction::{AccountKey, TokenBalance, TransactionView, NATIVE_MINT, UNITS_PER_NATIVE};
