//! Browser session lifecycle.
//!
//! A session owns at most one browser process and one tab. It moves through
//! `Uninitialized -> Launching -> Ready -> Closing -> Uninitialized`; a failed
//! launch drops straight back to `Uninitialized`.

use crate::config::{Environment, LaunchConfig};
use crate::live::launch::{launch_with_recovery, Launcher};
use crate::renderer::{RenderContext, Renderer};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Launching,
    Ready,
    Closing,
}

/// One browser and one page, opened on demand and always released.
pub struct BrowserSession {
    launcher: Arc<dyn Launcher>,
    config: LaunchConfig,
    environment: Environment,
    state: SessionState,
    renderer: Option<Box<dyn Renderer>>,
    context: Option<Box<dyn RenderContext>>,
    opened_at: Option<Instant>,
}

impl BrowserSession {
    pub fn new(launcher: Arc<dyn Launcher>, config: LaunchConfig, environment: Environment) -> Self {
        Self {
            launcher,
            config,
            environment,
            state: SessionState::Uninitialized,
            renderer: None,
            context: None,
            opened_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Launch the browser and open a page, or return the page already open.
    pub async fn open(&mut self) -> Result<&mut dyn RenderContext> {
        if self.state == SessionState::Ready && self.context.is_some() {
            return self.page();
        }

        if self.environment.is_production_like() {
            if let Err(e) = self.launcher.cleanup_stale().await {
                debug!(error = %format!("{e:#}"), "stale browser cleanup failed");
            }
        }

        self.state = SessionState::Launching;
        let renderer = match launch_with_recovery(self.launcher.as_ref(), &self.config).await {
            Ok(renderer) => renderer,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "browser launch failed permanently");
                self.state = SessionState::Uninitialized;
                return Err(e.into());
            }
        };

        let context = match renderer.new_context().await {
            Ok(context) => context,
            Err(e) => {
                if let Err(shutdown_err) = renderer.shutdown().await {
                    warn!(error = %shutdown_err, "failed to shut down browser after page error");
                }
                self.state = SessionState::Uninitialized;
                return Err(e.context("failed to open browser page"));
            }
        };

        self.renderer = Some(renderer);
        self.context = Some(context);
        self.opened_at = Some(Instant::now());
        self.state = SessionState::Ready;
        info!("browser session ready");

        self.page()
    }

    fn page(&mut self) -> Result<&mut dyn RenderContext> {
        match self.context.as_deref_mut() {
            Some(context) => Ok(context),
            None => Err(anyhow!("browser session has no page")),
        }
    }

    /// Release the page, then the browser. Never fails; safe to call twice.
    pub async fn close(&mut self) {
        if self.context.is_none() && self.renderer.is_none() {
            self.state = SessionState::Uninitialized;
            return;
        }

        self.state = SessionState::Closing;
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                warn!(error = %format!("{e:#}"), "failed to close browser page");
            }
        }
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown().await {
                warn!(error = %format!("{e:#}"), "failed to shut down browser");
            }
        }
        if let Some(opened_at) = self.opened_at.take() {
            debug!(
                open_ms = opened_at.elapsed().as_millis() as u64,
                "browser session closed"
            );
        }
        self.state = SessionState::Uninitialized;
    }
}
