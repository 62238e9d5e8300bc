//! Best-effort removal of browsers left behind by earlier runs.
//!
//! A crashed run can leave a Chromium process and its temp profile behind.
//! Every launch names its profile `unitwatch-chrome-<uuid>`, so both can be
//! found by that prefix.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// Prefix of every per-launch browser profile directory.
pub const PROFILE_PREFIX: &str = "unitwatch-chrome-";

/// What a cleanup pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub processes_killed: bool,
    pub profiles_removed: usize,
}

/// Kill stale browser processes, then delete their profile directories.
///
/// Both steps are best effort: a failure in one is logged and the other
/// still runs.
pub async fn cleanup_stale(profile_root: &Path) -> CleanupReport {
    cleanup_with(PKILL, profile_root).await
}

const PKILL: &str = "pkill";

async fn cleanup_with(pkill: &str, profile_root: &Path) -> CleanupReport {
    let processes_killed = match kill_stale_processes(pkill, profile_root).await {
        Ok(killed) => killed,
        Err(e) => {
            debug!(error = %format!("{e:#}"), "stale browser process cleanup failed");
            false
        }
    };
    let profiles_removed = match remove_stale_profiles(profile_root).await {
        Ok(removed) => removed,
        Err(e) => {
            debug!(error = %format!("{e:#}"), "stale browser profile cleanup failed");
            0
        }
    };
    if processes_killed || profiles_removed > 0 {
        info!(processes_killed, profiles_removed, "cleaned up stale browser state");
    }
    CleanupReport {
        processes_killed,
        profiles_removed,
    }
}

/// `pkill` every process launched with one of our profile directories.
/// Returns whether anything matched.
async fn kill_stale_processes(pkill: &str, profile_root: &Path) -> Result<bool> {
    let pattern = format!(
        "--user-data-dir={}",
        profile_root.join(PROFILE_PREFIX).display()
    );
    let status = tokio::process::Command::new(pkill)
        .arg("-f")
        .arg("--")
        .arg(&pattern)
        .status()
        .await
        .with_context(|| format!("failed to run {pkill}"))?;

    // pkill exits 1 when nothing matched.
    match status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => anyhow::bail!("{pkill} exited with {status}"),
    }
}

/// Delete every `unitwatch-chrome-*` directory directly under `profile_root`.
pub async fn remove_stale_profiles(profile_root: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(profile_root)
        .await
        .with_context(|| format!("failed to list {}", profile_root.display()))?;

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(PROFILE_PREFIX) {
            continue;
        }
        let path = entry.path();
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "could not remove stale profile"),
        }
    }
    Ok(removed)
}
