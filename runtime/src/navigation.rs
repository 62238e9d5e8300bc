//! Page loading with an ordered fallback of wait conditions.
//!
//! A slow or chatty site often never reaches one load condition while it
//! happily reaches another, so a load walks a ladder of strategies and stops
//! at the first one that succeeds. Whole-run retries live in the orchestrator.

use crate::config::NavigationConfig;
use crate::renderer::{NavigationResult, RenderContext, WaitUntil};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// One rung of the ladder: what to wait for and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStrategy {
    pub wait: WaitUntil,
    pub timeout: Duration,
}

impl LoadStrategy {
    pub fn new(wait: WaitUntil, timeout: Duration) -> Self {
        Self { wait, timeout }
    }

    /// DOM-ready, then full load, then network idle, each with a longer ceiling.
    pub fn default_ladder(config: &NavigationConfig) -> Vec<Self> {
        vec![
            Self::new(WaitUntil::DomContentLoaded, config.dom_timeout),
            Self::new(WaitUntil::Load, config.load_timeout),
            Self::new(WaitUntil::NetworkIdle, config.idle_timeout),
        ]
    }

    /// Single-step strategy for pages whose content arrives after load.
    pub fn network_idle(timeout: Duration) -> Vec<Self> {
        vec![Self::new(WaitUntil::NetworkIdle, timeout)]
    }
}

/// Every strategy failed.
#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("no load strategies given for {url}")]
    NoStrategies { url: String },

    #[error("failed to load {url} after {attempts} strategies: {last:#}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: anyhow::Error,
    },
}

/// Load `url`, trying each strategy in order until one succeeds.
///
/// Every strategy is tried at most once. On exhaustion the last strategy's
/// error is returned inside [`NavigationError::Exhausted`].
#[instrument(skip(page, strategies), fields(strategies = strategies.len()))]
pub async fn load(
    page: &mut dyn RenderContext,
    url: &str,
    strategies: &[LoadStrategy],
) -> Result<NavigationResult, NavigationError> {
    let mut last_error = None;

    for (i, strategy) in strategies.iter().enumerate() {
        match page.navigate(url, strategy.wait, strategy.timeout).await {
            Ok(result) => {
                debug!(
                    strategy = %strategy.wait,
                    load_time_ms = result.load_time_ms,
                    "page loaded"
                );
                return Ok(result);
            }
            Err(e) => {
                warn!(
                    strategy = %strategy.wait,
                    timeout_ms = strategy.timeout.as_millis() as u64,
                    remaining = strategies.len() - i - 1,
                    error = %format!("{e:#}"),
                    "load strategy failed"
                );
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => Err(NavigationError::Exhausted {
            url: url.to_string(),
            attempts: strategies.len(),
            last,
        }),
        None => Err(NavigationError::NoStrategies {
            url: url.to_string(),
        }),
    }
}
