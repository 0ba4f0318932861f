//! Mirroring configuration.

use std::env;

use anyhow::{anyhow, bail, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::UNITS_PER_NATIVE;

/// Configuration for mirroring, sizing and liquidation.
///
/// Amount fields are base units; `from_env` accepts whole-token decimals
/// for the caps and converts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Leader account whose confirmed transactions are mirrored
    pub leader: String,

    /// Fraction of the leader's spend to mirror (> 0)
    pub follow_ratio: Decimal,

    /// Hard cap per mirrored buy, native base units
    pub max_per_trade: u64,

    /// Native balance that must stay untouched, base units
    pub reserve_min: u64,

    /// Mirror leader sells with staged liquidation
    pub mirror_sell: bool,

    /// Minimum seconds between mirrored actions on the same asset
    pub cooldown_secs: u64,

    /// Fraction of the remaining quantity sold at each step, each in (0, 1],
    /// conventionally ending in 1.0
    pub sell_schedule: Vec<Decimal>,

    /// Wallets whose presence among an asset's holders boosts the buy
    pub priority_holders: Vec<String>,

    /// Wallets whose presence among an asset's holders blocks the buy
    pub denied_holders: Vec<String>,

    /// Multiplier applied to the sized amount for priority assets (>= 1)
    pub priority_weight: Decimal,

    /// Slippage tolerance forwarded to the swap aggregator, basis points
    pub slippage_bps: u32,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Pubsub endpoint for the log subscription
    pub ws_url: String,

    /// Indexer base URL for holder lookups; the RPC fallback is used
    /// when unset
    pub holder_api_url: Option<String>,

    /// API key for the holder indexer
    pub holder_api_key: Option<String>,

    /// Path of the persisted position file
    pub positions_path: String,

    /// Seconds to wait before the first settlement poll
    pub settle_delay_secs: u64,

    /// Settlement polls before giving up and recording spend only
    pub settle_attempts: u32,

    /// Heartbeat ping interval for the log subscription, seconds
    pub ping_interval_secs: u64,

    /// Seconds without a pong before the connection counts as dead
    pub pong_timeout_secs: u64,

    /// Upper bound for the reconnect backoff, seconds
    pub reconnect_max_delay_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            leader: String::new(),
            follow_ratio: dec!(0.01),          // We spend 1% of what the leader spends
            max_per_trade: 180_000_000,        // 0.18 native per buy
            reserve_min: 20_000_000,           // Keep 0.02 native untouched
            mirror_sell: true,
            cooldown_secs: 6,
            sell_schedule: vec![
                dec!(0.25), // First sale: 25% of the position
                dec!(0.40), // Then 40% of the remainder
                dec!(0.50),
                dec!(0.50),
                dec!(1.00), // Final sale closes the position
            ],
            priority_holders: Vec::new(),
            denied_holders: Vec::new(),
            priority_weight: dec!(2),
            slippage_bps: 1280,
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            holder_api_url: None,
            holder_api_key: None,
            positions_path: "positions.json".to_string(),
            settle_delay_secs: 15,
            settle_attempts: 3,
            ping_interval_secs: 20,
            pong_timeout_secs: 10,
            reconnect_max_delay_secs: 30,
        }
    }
}

impl MirrorConfig {
    /// Build from `MIRROR_*` environment variables (call after `dotenvy`),
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(leader) = env::var("MIRROR_LEADER") {
            cfg.leader = leader.trim().to_string();
        }
        if let Some(ratio) = parsed_var::<Decimal>("MIRROR_FOLLOW_RATIO")? {
            cfg.follow_ratio = ratio;
        }
        if let Some(cap) = parsed_var::<Decimal>("MIRROR_MAX_PER_TRADE_SOL")? {
            cfg.max_per_trade = to_base_units("MIRROR_MAX_PER_TRADE_SOL", cap)?;
        }
        if let Some(reserve) = parsed_var::<Decimal>("MIRROR_RESERVE_SOL")? {
            cfg.reserve_min = to_base_units("MIRROR_RESERVE_SOL", reserve)?;
        }
        if let Some(mirror_sell) = parsed_var::<bool>("MIRROR_SELL")? {
            cfg.mirror_sell = mirror_sell;
        }
        if let Some(cooldown) = parsed_var::<u64>("MIRROR_COOLDOWN_SECS")? {
            cfg.cooldown_secs = cooldown;
        }
        if let Some(schedule) = decimal_list_var("MIRROR_SELL_SCHEDULE")? {
            cfg.sell_schedule = schedule;
        }
        if let Some(holders) = list_var("MIRROR_PRIORITY_HOLDERS") {
            cfg.priority_holders = holders;
        }
        if let Some(holders) = list_var("MIRROR_DENIED_HOLDERS") {
            cfg.denied_holders = holders;
        }
        if let Some(weight) = parsed_var::<Decimal>("MIRROR_PRIORITY_WEIGHT")? {
            cfg.priority_weight = weight;
        }
        if let Some(bps) = parsed_var::<u32>("MIRROR_SLIPPAGE_BPS")? {
            cfg.slippage_bps = bps;
        }
        if let Ok(url) = env::var("MIRROR_RPC_URL") {
            cfg.rpc_url = url.trim().to_string();
        }
        if let Ok(url) = env::var("MIRROR_WS_URL") {
            cfg.ws_url = url.trim().to_string();
        }
        if let Ok(url) = env::var("MIRROR_HOLDER_API_URL") {
            cfg.holder_api_url = Some(url.trim().to_string());
        }
        if let Ok(key) = env::var("MIRROR_HOLDER_API_KEY") {
            cfg.holder_api_key = Some(key.trim().to_string());
        }
        if let Ok(path) = env::var("MIRROR_POSITIONS_PATH") {
            cfg.positions_path = path.trim().to_string();
        }
        if let Some(delay) = parsed_var::<u64>("MIRROR_SETTLE_DELAY_SECS")? {
            cfg.settle_delay_secs = delay;
        }
        if let Some(attempts) = parsed_var::<u32>("MIRROR_SETTLE_ATTEMPTS")? {
            cfg.settle_attempts = attempts;
        }
        if let Some(interval) = parsed_var::<u64>("MIRROR_PING_INTERVAL_SECS")? {
            cfg.ping_interval_secs = interval;
        }
        if let Some(timeout) = parsed_var::<u64>("MIRROR_PONG_TIMEOUT_SECS")? {
            cfg.pong_timeout_secs = timeout;
        }
        if let Some(delay) = parsed_var::<u64>("MIRROR_RECONNECT_MAX_DELAY_SECS")? {
            cfg.reconnect_max_delay_secs = delay;
        }

        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.leader.is_empty() {
            bail!("leader account is not set (MIRROR_LEADER)");
        }
        if self.follow_ratio <= Decimal::ZERO {
            bail!("follow ratio must be > 0, got {}", self.follow_ratio);
        }
        if self.priority_weight < Decimal::ONE {
            bail!(
                "priority weight must be >= 1, got {}",
                self.priority_weight
            );
        }
        if self.sell_schedule.is_empty() {
            bail!("sell schedule must have at least one step");
        }
        for (step, fraction) in self.sell_schedule.iter().enumerate() {
            if *fraction <= Decimal::ZERO || *fraction > Decimal::ONE {
                bail!(
                    "sell schedule step {} must be in (0, 1], got {}",
                    step,
                    fraction
                );
            }
        }
        if self.settle_attempts == 0 {
            bail!("settle attempts must be >= 1");
        }
        if self.rpc_url.is_empty() || self.ws_url.is_empty() {
            bail!("rpc and websocket endpoints must be set");
        }
        Ok(())
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .map_err(|err| anyhow!("invalid {name} ({raw:?}): {err}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

fn list_var(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn decimal_list_var(name: &str) -> Result<Option<Vec<Decimal>>> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    let mut fractions = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let fraction = entry
            .parse::<Decimal>()
            .map_err(|err| anyhow!("invalid {name} entry {entry:?}: {err}"))?;
        fractions.push(fraction);
    }
    Ok(Some(fractions))
}

fn to_base_units(name: &str, whole: Decimal) -> Result<u64> {
    (whole * Decimal::from(UNITS_PER_NATIVE))
        .floor()
        .to_u64()
        .ok_or_else(|| anyhow!("{name} does not fit in base units: {whole}"))
}
