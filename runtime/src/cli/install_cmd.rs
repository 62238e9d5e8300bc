//! `unitwatch install`: fetch a browser with the configured install command.

use super::output;
use crate::config::LaunchConfig;
use crate::live::launch::run_install_command;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;

/// Install Chromium unless one is already present (or `force` is set).
pub async fn run(config: &LaunchConfig, force: bool) -> Result<()> {
    if !force {
        if let Some(path) = find_chromium(config.chromium_path.as_deref()) {
            if !output::is_quiet() {
                println!("Chromium already installed: {}", path.display());
                println!("  Use --force to reinstall.");
            }
            return Ok(());
        }
    }

    if !output::is_quiet() {
        println!("Installing Chromium: {}", config.install_command);
    }
    run_install_command(&config.install_command).await?;

    match find_chromium(config.chromium_path.as_deref()) {
        Some(path) if !output::is_quiet() => println!("Installed: {}", path.display()),
        Some(_) => {}
        None => anyhow::bail!(
            "install command finished but no Chromium binary was found; set UNITWATCH_CHROMIUM_PATH"
        ),
    }
    Ok(())
}
