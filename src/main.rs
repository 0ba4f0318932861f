//! Solana Mirror-Trading Bot
//!
//! Watches a leader wallet's confirmed swaps and mirrors them from a
//! follower wallet with proportional sizing and staged liquidation.

mod bot;
mod models;
mod rpc;
mod store;
mod swap;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::Bot;
use crate::models::UNITS_PER_NATIVE;
use crate::rpc::{LedgerSource, RpcClient};
use crate::store::PositionStore;
use crate::swap::Wallet;
use crate::trading::{classify, reconcile_positions, MirrorConfig};

/// Solana mirror-trading bot CLI.
#[derive(Parser)]
#[command(name = "solmirror")]
#[command(about = "Mirror a leader wallet's swaps with proportional sizing", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring the configured leader
    Run {
        /// Decide and log orders without sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// List tracked positions
    Positions,

    /// Show the active configuration
    Config,

    /// Classify one confirmed transaction without trading
    Classify {
        /// Transaction signature to inspect
        signature: String,
    },

    /// Reconcile stored positions against live chain balances
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = MirrorConfig::from_env()?;

    match cli.command {
        Commands::Run { dry_run } => {
            info!(dry_run = dry_run, "Starting mirror bot");

            let follow_ratio = config.follow_ratio;
            let mut bot = Bot::new(config, dry_run).await?;

            println!("\n=== Solana Mirror-Trading Bot ===");
            println!("Leader:       {}", bot.leader());
            println!("Follower:     {}", bot.follower());
            println!("Follow ratio: {}", follow_ratio);
            println!(
                "Mode:         {}",
                if dry_run {
                    "DRY RUN (no orders sent)"
                } else {
                    "LIVE TRADING"
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let stats = bot.run().await?;
            println!("\n{}", stats);
        }

        Commands::Positions => {
            let store = PositionStore::load(&config.positions_path).await?;

            if store.is_empty() {
                println!("No tracked positions.");
                return Ok(());
            }

            println!(
                "\n{:<44} {:>16} {:>14} {:>5}  {}",
                "ASSET", "QUANTITY", "COST (SOL)", "STEP", "UPDATED"
            );
            println!("{}", "-".repeat(100));

            for (asset, position) in store.iter() {
                println!(
                    "{:<44} {:>16} {:>14.4} {:>5}  {}",
                    asset,
                    position.quantity,
                    position.cost_basis as f64 / UNITS_PER_NATIVE as f64,
                    position.sell_step,
                    position.updated_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }

        Commands::Config => {
            println!("\n=== Mirror Configuration ===\n");
            println!("Leader:           {}", config.leader);
            println!("Follow ratio:     {}", config.follow_ratio);
            println!(
                "Max per trade:    {} SOL",
                config.max_per_trade as f64 / UNITS_PER_NATIVE as f64
            );
            println!(
                "Reserve:          {} SOL",
                config.reserve_min as f64 / UNITS_PER_NATIVE as f64
            );
            println!("Mirror sells:     {}", config.mirror_sell);
            println!("Cooldown:         {}s", config.cooldown_secs);
            println!("Slippage:         {} bps", config.slippage_bps);
            println!("Sell schedule:    {:?}", config.sell_schedule);

            println!("\nHolder lists:");
            println!("  Priority:       {}", list_or_none(&config.priority_holders));
            println!("  Priority boost: x{}", config.priority_weight);
            println!("  Denied:         {}", list_or_none(&config.denied_holders));

            println!("\nEndpoints:");
            println!("  RPC:            {}", config.rpc_url);
            println!("  WebSocket:      {}", config.ws_url);
            println!(
                "  Holder API:     {}",
                config.holder_api_url.as_deref().unwrap_or("(none)")
            );
            println!(
                "  Holder API key: {}",
                if config.holder_api_key.is_some() { "set" } else { "(none)" }
            );

            println!("\nSettlement:");
            println!("  Delay:          {}s", config.settle_delay_secs);
            println!("  Attempts:       {}", config.settle_attempts);

            println!("\nState:");
            println!("  Positions file: {}", config.positions_path);
        }

        Commands::Classify { signature } => {
            config.validate()?;
            let rpc = RpcClient::new(&config)?;

            match rpc.transaction(&signature).await? {
                None => println!("Transaction not found or not yet confirmed."),
                Some(view) => match classify(&view, &config.leader, config.mirror_sell) {
                    None => println!("No mirrorable leader action in {}.", signature),
                    Some(action) => {
                        println!("\n=== Leader Action ===");
                        println!("Signature: {}", view.signature);
                        println!("Kind:      {}", action.kind.as_str());
                        println!("Asset:     {}", action.asset);
                        println!("Magnitude: {} base units", action.magnitude);

                        let spent = view.spent_amount(&config.leader);
                        if spent < 0 {
                            println!(
                                "Spent:     {:.4} SOL",
                                spent.unsigned_abs() as f64 / UNITS_PER_NATIVE as f64
                            );
                        }
                    }
                },
            }
        }

        Commands::Reconcile => {
            let wallet = Wallet::from_env()?;
            let rpc = RpcClient::new(&config)?;
            let mut store = PositionStore::load(&config.positions_path).await?;

            if store.is_empty() {
                println!("No tracked positions.");
                return Ok(());
            }

            let report = reconcile_positions(&mut store, &rpc, wallet.pubkey()).await?;

            println!("\n{:<44} {:>16} {:>16}  {}", "ASSET", "STORED", "LIVE", "RESULT");
            println!("{}", "-".repeat(90));

            for entry in &report {
                let live = entry
                    .live
                    .map_or_else(|| "unavailable".to_string(), |v| v.to_string());
                let result = if entry.dropped {
                    "dropped"
                } else if entry.live.is_none() {
                    "unchanged"
                } else if entry.live == Some(entry.stored) {
                    "in sync"
                } else {
                    "adjusted"
                };
                println!(
                    "{:<44} {:>16} {:>16}  {}",
                    entry.asset, entry.stored, live, result
                );
            }
        }
    }

    Ok(())
}

/// Render a holder list, or a placeholder when empty.
fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
