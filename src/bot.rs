//! Bot runner: wires the leader log stream into the mirror engine.
//!
//! Handles:
//! - Subscribing to logs that mention the leader account
//! - Feeding confirmed signatures through the mirror engine in order
//! - Counting outcomes for the session summary
//! - Stopping cleanly on Ctrl-C or when the stream ends

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::UNITS_PER_NATIVE;
use crate::rpc::{LogStream, RpcClient};
use crate::store::PositionStore;
use crate::swap::{AggregatorClient, Wallet};
use crate::trading::{MirrorConfig, MirrorEngine, MirrorOutcome};

/// Signatures buffered between the stream task and the engine. Bursts past
/// this apply backpressure to the socket reader.
const SIGNATURE_BUFFER: usize = 256;

/// Main bot runner.
pub struct Bot {
    config: MirrorConfig,
    engine: MirrorEngine,
    follower: String,
    stats: BotStats,
}

impl Bot {
    /// Build the full stack: wallet, RPC client, aggregator, position store.
    pub async fn new(config: MirrorConfig, dry_run: bool) -> Result<Self> {
        config.validate()?;

        let wallet = Wallet::from_env().context("Follower wallet unavailable")?;
        let follower = wallet.pubkey().to_string();

        let rpc = Arc::new(RpcClient::new(&config).context("Failed to create RPC client")?);
        let executor = Arc::new(
            AggregatorClient::new(&config, wallet, rpc.clone())
                .context("Failed to create aggregator client")?,
        );
        let store = PositionStore::load(&config.positions_path).await?;

        info!(
            leader = %config.leader,
            follower = %follower,
            follow_ratio = %config.follow_ratio,
            max_per_trade_sol = config.max_per_trade as f64 / UNITS_PER_NATIVE as f64,
            reserve_sol = config.reserve_min as f64 / UNITS_PER_NATIVE as f64,
            mirror_sell = config.mirror_sell,
            positions = store.len(),
            dry_run,
            "Mirror bot initialized"
        );

        let engine = MirrorEngine::new(
            config.clone(),
            rpc,
            executor,
            store,
            follower.clone(),
            dry_run,
        );

        Ok(Self {
            config,
            engine,
            follower,
            stats: BotStats::default(),
        })
    }

    pub fn leader(&self) -> &str {
        &self.config.leader
    }

    pub fn follower(&self) -> &str {
        &self.follower
    }

    /// Main loop: consume leader signatures until Ctrl-C or stream end.
    ///
    /// Store failures end the loop; mirroring must not continue once fills
    /// can no longer be recorded.
    pub async fn run(&mut self) -> Result<BotStats> {
        let (tx, mut rx) = mpsc::channel(SIGNATURE_BUFFER);
        let (stream, mut state_rx) = LogStream::new(&self.config);
        tokio::spawn(stream.run(tx));

        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = state_rx.borrow_and_update().clone();
                info!(state = %state, "Log stream state changed");
            }
        });

        info!("Mirroring started");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                signature = rx.recv() => {
                    let Some(signature) = signature else {
                        warn!("Log stream ended");
                        break;
                    };
                    self.stats.received += 1;
                    let outcome = self.engine.handle_signature(&signature).await?;
                    self.stats.record(&outcome);
                }
            }
        }

        info!(
            received = self.stats.received,
            mirrored = self.stats.mirrored,
            suppressed = self.stats.suppressed,
            ignored = self.stats.ignored,
            failed = self.stats.failed,
            positions = self.engine.positions().len(),
            "Mirror bot stopped"
        );
        Ok(self.stats)
    }
}

/// Counters for one mirroring session.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotStats {
    pub received: u64,
    pub mirrored: u64,
    pub suppressed: u64,
    pub ignored: u64,
    pub failed: u64,
    pub cleaned: u64,
    pub dry_skipped: u64,
}

impl BotStats {
    fn record(&mut self, outcome: &MirrorOutcome) {
        match outcome {
            MirrorOutcome::Bought { .. } | MirrorOutcome::Sold { .. } => self.mirrored += 1,
            MirrorOutcome::Suppressed { .. } => self.suppressed += 1,
            MirrorOutcome::Ignored { .. } => self.ignored += 1,
            MirrorOutcome::ExecutionFailed { .. } => self.failed += 1,
            MirrorOutcome::Cleaned { .. } => self.cleaned += 1,
            MirrorOutcome::SkippedDryRun { .. } => self.dry_skipped += 1,
        }
    }
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Summary ===")?;
        writeln!(f, "Signatures seen:   {}", self.received)?;
        writeln!(f, "Orders mirrored:   {}", self.mirrored)?;
        writeln!(f, "Suppressed:        {}", self.suppressed)?;
        writeln!(f, "Ignored:           {}", self.ignored)?;
        writeln!(f, "Execution failed:  {}", self.failed)?;
        writeln!(f, "Positions cleaned: {}", self.cleaned)?;
        if self.dry_skipped > 0 {
            writeln!(f, "Dry-run skipped:   {}", self.dry_skipped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;

    #[test]
    fn test_stats_bucket_outcomes() {
        let mut stats = BotStats::default();
        stats.record(&MirrorOutcome::Bought {
            asset: "MintX".to_string(),
            spent: 1,
            received: 1,
        });
        stats.record(&MirrorOutcome::Sold {
            asset: "MintX".to_string(),
            sold: 1,
            liquidated: false,
        });
        stats.record(&MirrorOutcome::Suppressed {
            asset: "MintX".to_string(),
            reason: "cooldown".to_string(),
        });
        stats.record(&MirrorOutcome::Ignored {
            cause: "no leader action".to_string(),
        });
        stats.record(&MirrorOutcome::SkippedDryRun {
            asset: "MintX".to_string(),
            kind: ActionKind::Buy,
            amount: 5,
        });

        assert_eq!(stats.mirrored, 2);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.dry_skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_stats_display_hides_dry_row_when_zero() {
        let stats = BotStats {
            received: 3,
            ..BotStats::default()
        };
        let rendered = stats.to_string();
        assert!(rendered.contains("Signatures seen:   3"));
        assert!(!rendered.contains("Dry-run skipped"));
    }
}
