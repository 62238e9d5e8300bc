//! Browser launch with classified recovery.
//!
//! A failed launch is classified into one of four kinds, and each kind gets
//! exactly one corrective retry:
//!
//! | Failure | Recovery |
//! |---|---|
//! | `ExecutableNotFound` | install the browser once, retry |
//! | `Timeout` | retry with the extended timeout |
//! | `SpawnFailure` | wait the spawn cooldown, retry |
//! | `Other` | none, fatal |
//!
//! Classification looks at the structured error values from chromiumoxide
//! and `std::io`, never at message text.

use crate::config::LaunchConfig;
use crate::live::cleanup;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::{bail, Context};
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a browser launch failed.
#[derive(Debug, thiserror::Error)]
pub enum LaunchFailure {
    #[error("browser executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("browser launch timed out: {0}")]
    Timeout(String),

    #[error("browser process failed to spawn: {0}")]
    SpawnFailure(String),

    #[error("browser dependency install failed: {0}")]
    InstallFailed(String),

    #[error("browser launch failed: {0}")]
    Other(String),
}

impl LaunchFailure {
    /// Classify an error returned by `Browser::launch`.
    pub fn from_cdp(err: &CdpError) -> Self {
        match err {
            CdpError::LaunchTimeout(..) | CdpError::Timeout => Self::Timeout(err.to_string()),
            CdpError::LaunchIo(io, ..) | CdpError::Io(io) => Self::from_io(io),
            CdpError::LaunchExit(..) => Self::SpawnFailure(err.to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify an I/O error raised while starting the browser process.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::ExecutableNotFound(err.to_string()),
            ErrorKind::TimedOut => Self::Timeout(err.to_string()),
            _ => Self::SpawnFailure(err.to_string()),
        }
    }

    /// Short, stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound(_) => "executable_not_found",
            Self::Timeout(_) => "timeout",
            Self::SpawnFailure(_) => "spawn_failure",
            Self::InstallFailed(_) => "install_failed",
            Self::Other(_) => "other",
        }
    }
}

/// Starts browser processes. The seam that lets the recovery logic run
/// without a real browser.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a browser, giving up after `timeout`.
    async fn launch(&self, timeout: Duration) -> Result<Box<dyn Renderer>, LaunchFailure>;

    /// Install the browser dependency.
    async fn install(&self) -> anyhow::Result<()>;

    /// Kill leftover browser processes and delete their temp profiles.
    async fn cleanup_stale(&self) -> anyhow::Result<()>;
}

/// Launch, applying the one-shot recovery that matches the failure kind.
pub async fn launch_with_recovery(
    launcher: &dyn Launcher,
    config: &LaunchConfig,
) -> Result<Box<dyn Renderer>, LaunchFailure> {
    let failure = match launcher.launch(config.timeout).await {
        Ok(renderer) => return Ok(renderer),
        Err(failure) => failure,
    };

    warn!(kind = failure.kind(), error = %failure, "browser launch failed");

    let retried = match failure {
        LaunchFailure::ExecutableNotFound(_) => {
            info!("installing browser dependency before retrying launch");
            launcher
                .install()
                .await
                .map_err(|e| LaunchFailure::InstallFailed(format!("{e:#}")))?;
            launcher.launch(config.timeout).await
        }
        LaunchFailure::Timeout(_) => {
            info!(
                timeout_secs = config.extended_timeout.as_secs(),
                "retrying launch with extended timeout"
            );
            launcher.launch(config.extended_timeout).await
        }
        LaunchFailure::SpawnFailure(_) => {
            info!(
                cooldown_ms = config.spawn_cooldown.as_millis() as u64,
                "waiting before retrying launch"
            );
            tokio::time::sleep(config.spawn_cooldown).await;
            launcher.launch(config.timeout).await
        }
        LaunchFailure::InstallFailed(_) | LaunchFailure::Other(_) => return Err(failure),
    };

    if let Err(e) = &retried {
        warn!(kind = e.kind(), error = %e, "browser launch retry failed");
    }
    retried
}

/// Launches headless Chromium.
pub struct ChromiumLauncher {
    config: LaunchConfig,
}

impl ChromiumLauncher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, timeout: Duration) -> Result<Box<dyn Renderer>, LaunchFailure> {
        let renderer = ChromiumRenderer::launch(&self.config, timeout).await?;
        Ok(Box::new(renderer))
    }

    async fn install(&self) -> anyhow::Result<()> {
        run_install_command(&self.config.install_command).await
    }

    async fn cleanup_stale(&self) -> anyhow::Result<()> {
        let report = cleanup::cleanup_stale(&self.config.profile_root).await;
        debug!(
            processes_killed = report.processes_killed,
            profiles_removed = report.profiles_removed,
            "stale browser cleanup finished"
        );
        Ok(())
    }
}

/// Run the configured install command through the shell.
pub async fn run_install_command(command: &str) -> anyhow::Result<()> {
    if command.trim().is_empty() {
        bail!("no install command configured (set UNITWATCH_INSTALL_CMD)");
    }
    info!(%command, "running browser install command");

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .with_context(|| format!("failed to run install command: {command}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "install command exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }
    Ok(())
}
