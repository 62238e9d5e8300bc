//! `unitwatch watch`: run on a fixed interval until interrupted.

use super::run_cmd;
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Execute a run every `every`, starting immediately.
///
/// A run that overlaps the next tick delays it; missed ticks are skipped
/// rather than replayed. A failed run does not stop the loop.
pub async fn run(config: Config, every: Duration) -> Result<()> {
    let orchestrator = run_cmd::build_orchestrator(config)?;

    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        shutdown_signal.notify_one();
    });

    info!(every_secs = every.as_secs(), "watch loop started");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!(runs, "watch loop stopping");
                break;
            }
            _ = ticker.tick() => {
                runs = runs.saturating_add(1);
                match orchestrator.execute().await {
                    Ok(outcome) => run_cmd::print_outcome(&outcome),
                    Err(e) => warn!(run = runs, error = %format!("{e:#}"), "scheduled run failed"),
                }
            }
        }
    }
    Ok(())
}
