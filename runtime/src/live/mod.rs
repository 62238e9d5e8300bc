//! Browser process lifecycle: launch with recovery, stale-state cleanup,
//! and the session that owns the browser for one run.

pub mod cleanup;
pub mod launch;
pub mod session;

pub use launch::{ChromiumLauncher, LaunchFailure, Launcher};
pub use session::{BrowserSession, SessionState};
