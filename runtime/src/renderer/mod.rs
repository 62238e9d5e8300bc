//! Renderer abstraction for browser-driven page access.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide, or static HTML for
//! fixtures and offline inspection).

pub mod chromium;
pub mod static_page;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Load-completion condition a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaitUntil {
    /// The document has been parsed (`readyState != "loading"`).
    DomContentLoaded,
    /// The `load` event has fired.
    Load,
    /// Loaded, and no new network resources for a short quiet window.
    NetworkIdle,
}

impl std::fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DomContentLoaded => write!(f, "domcontentloaded"),
            Self::Load => write!(f, "load"),
            Self::NetworkIdle => write!(f, "networkidle"),
        }
    }
}

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken until the wait condition was met, in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine and release its process.
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// A single browser context (tab).
///
/// Element operations address the `index`-th match of a CSS selector, in
/// document order.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait for `wait`, giving up after `timeout`.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationResult>;

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Whether at least one element matches `selector`.
    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.count(selector).await? > 0)
    }

    /// Scroll the `index`-th match into the viewport.
    async fn scroll_into_view(&self, selector: &str, index: usize, timeout: Duration)
        -> Result<()>;

    /// Visible text of the `index`-th match.
    async fn text_at(&self, selector: &str, index: usize, timeout: Duration) -> Result<String>;

    /// Visible text of the first `inner` match inside the `index`-th `selector` match.
    async fn inner_text_at(
        &self,
        selector: &str,
        index: usize,
        inner: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Visible text of every match, in document order.
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    /// Click the first match.
    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Visible text of the whole page body.
    async fn body_text(&self) -> Result<String>;

    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
