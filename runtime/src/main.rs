// Copyright 2026 Unitwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use unitwatch_runtime::cli;
use unitwatch_runtime::config::Config;

#[derive(Parser)]
#[command(
    name = "unitwatch",
    about = "Unitwatch: studio and 1BR availability watcher",
    version,
    after_help = "Site and storage settings come from UNITWATCH_* environment variables.\nRun 'unitwatch doctor' to see the effective configuration."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Site origin (overrides UNITWATCH_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Unit store path (overrides UNITWATCH_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Notification webhook (overrides UNITWATCH_WEBHOOK_URL)
    #[arg(long, global = true)]
    webhook: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape once, update the store and announce new units
    Run,
    /// Scrape on a fixed interval until interrupted
    Watch {
        /// Seconds between runs
        #[arg(long, default_value = "3600", value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,
    },
    /// Extract units from a saved floorplan detail page
    Inspect {
        /// HTML file to read
        file: PathBuf,
        /// Floorplan name to attribute the units to
        #[arg(long, default_value = "Unknown")]
        floorplan: String,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Install Chromium with the configured install command
    Install {
        /// Reinstall even if Chromium is already present
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "unitwatch=debug" } else { "unitwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(base_url) = &cli.base_url {
        config.site.base_url = base_url.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(webhook) = &cli.webhook {
        config.webhook_url = Some(webhook.clone());
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global output flags are read back through cli::output.
    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(cli::output::QUIET_ENV, "1");
    }
    init_tracing(cli.verbose, cli.log_json);

    let config = load_config(&cli);
    let result = match &cli.command {
        Commands::Run => cli::run_cmd::run(config).await,
        Commands::Watch { every } => cli::watch_cmd::run(config, Duration::from_secs(*every)).await,
        Commands::Inspect { file, floorplan } => {
            cli::inspect_cmd::run(file, floorplan, &config.site).await
        }
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Install { force } => cli::install_cmd::run(&config.launch, *force).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "unitwatch", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
