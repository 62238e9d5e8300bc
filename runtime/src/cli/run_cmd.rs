//! `unitwatch run`: one scrape, reconciled against the store.

use super::output;
use crate::config::Config;
use crate::live::ChromiumLauncher;
use crate::notify::{LogSink, NotificationSink, WebhookSink};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Wire the production collaborators around `config`.
pub fn build_orchestrator(config: Config) -> Result<Orchestrator> {
    config
        .site
        .index_url()
        .context("cannot build the floorplan index URL")?;

    let store = SqliteStore::open(&config.db_path)?;
    let sink: Arc<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())),
        None => Arc::new(LogSink),
    };
    let launcher = Arc::new(ChromiumLauncher::new(config.launch.clone()));
    Ok(Orchestrator::new(config, launcher, Arc::new(store), sink))
}

pub async fn run(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let outcome = orchestrator.execute().await?;
    print_outcome(&outcome);
    Ok(())
}

/// Summarize one run on stdout.
pub fn print_outcome(outcome: &RunOutcome) {
    if output::is_json() {
        output::print_json(outcome);
        return;
    }
    if output::is_quiet() {
        return;
    }

    let elapsed = outcome.completed - outcome.started;
    println!(
        "Run {} finished in {:.1}s after {} attempt(s)",
        outcome.run_id,
        elapsed.num_milliseconds() as f64 / 1000.0,
        outcome.attempts
    );
    println!(
        "  {} unit(s) listed, {} new, {} retired",
        outcome.apartments.len(),
        outcome.new_units.len(),
        outcome.removed
    );
    for unit in &outcome.new_units {
        let available = unit
            .availability_date
            .map(|d| d.format("%b %-d, %Y").to_string())
            .unwrap_or_else(|| "date unknown".to_string());
        println!(
            "  + {:<12} {:<24} {}BR  ${:<6} {}",
            unit.unit_number, unit.floorplan_name, unit.bedroom_count, unit.rent, available
        );
    }
    for error in &outcome.errors {
        println!("  [!!] {error}");
    }
}
