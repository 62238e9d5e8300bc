//! Environment readiness check.

use super::output;
use crate::config::Config;
use crate::renderer::chromium::find_chromium;
use crate::store::SqliteStore;
use anyhow::Result;
use serde_json::json;

/// Check the browser, the site configuration, the store and the notifier.
pub async fn run(config: &Config) -> Result<()> {
    let chromium = find_chromium(config.launch.chromium_path.as_deref());
    let index_url = config.site.index_url();
    let store = SqliteStore::open(&config.db_path);
    let last_run = match &store {
        Ok(store) => store.recent_runs(1).ok().and_then(|runs| runs.into_iter().next()),
        Err(_) => None,
    };
    let ready = chromium.is_some() && index_url.is_ok() && store.is_ok();

    if output::is_json() {
        output::print_json(&json!({
            "ready": ready,
            "environment": config.environment.as_str(),
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "index_url": index_url.as_ref().ok(),
            "db_path": config.db_path.display().to_string(),
            "store_error": store.as_ref().err().map(|e| format!("{e:#}")),
            "webhook": config.webhook_url.is_some(),
            "last_run": last_run,
        }));
        return Ok(());
    }

    println!("Unitwatch Doctor");
    println!("================");
    println!();
    println!("OS:          {}", std::env::consts::OS);
    println!("Arch:        {}", std::env::consts::ARCH);
    println!("Environment: {}", config.environment.as_str());
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Run `unitwatch install`."),
    }
    match &index_url {
        Ok(url) => println!("[OK] Floorplan index: {url}"),
        Err(e) => println!("[!!] {e:#}"),
    }
    match &store {
        Ok(_) => println!("[OK] Unit store: {}", config.db_path.display()),
        Err(e) => println!("[!!] {e:#}"),
    }
    match &config.webhook_url {
        Some(url) => println!("[OK] Webhook: {url}"),
        None => println!("[--] No webhook configured; new units are logged only"),
    }
    match &last_run {
        Some(run) => println!(
            "[--] Last run: {} at {} ({} units, {} new)",
            run.status.as_str(),
            run.started.format("%Y-%m-%d %H:%M UTC"),
            run.units_found,
            run.new_units
        ),
        None => println!("[--] No runs recorded yet"),
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
