//! Chromium-based renderer using chromiumoxide.

use super::{NavigationResult, RenderContext, Renderer, WaitUntil};
use crate::config::{unitwatch_home, LaunchConfig};
use crate::live::cleanup::PROFILE_PREFIX;
use crate::live::launch::LaunchFailure;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Ceiling for scripts that have no caller-supplied timeout.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Resource count must hold still this long to count as network idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);

const MAC_TESTING_BINARY: &str =
    "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";

/// Find the Chromium binary path.
///
/// Order: explicit override, `~/.unitwatch/chromium` (as laid out by
/// `@puppeteer/browsers`), system `PATH`, the stock macOS install.
pub fn find_chromium(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!(path = %path.display(), "configured Chromium path does not exist");
    }

    let root = unitwatch_home().join("chromium");
    if let Some(path) = find_in_install_root(&root) {
        return Some(path);
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Look for a browser under an install root, either flat or versioned
/// (`chrome/<platform>-<version>/chrome-*/...`).
fn find_in_install_root(root: &Path) -> Option<PathBuf> {
    let platform_binaries: Vec<PathBuf> = if cfg!(target_os = "macos") {
        vec![
            Path::new("chrome-mac-arm64").join(MAC_TESTING_BINARY),
            Path::new("chrome-mac-x64").join(MAC_TESTING_BINARY),
        ]
    } else {
        vec![PathBuf::from("chrome-linux64/chrome")]
    };

    for rel in &platform_binaries {
        let candidate = root.join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let versions = std::fs::read_dir(root.join("chrome")).ok()?;
    let mut dirs: Vec<PathBuf> = versions.flatten().map(|e| e.path()).collect();
    // Newest version last after sorting; prefer it.
    dirs.sort();
    for dir in dirs.iter().rev() {
        for rel in &platform_binaries {
            let candidate = dir.join(rel);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// A headless Chromium process with its own temp profile.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl ChromiumRenderer {
    /// Launch headless Chromium, giving up after `timeout`.
    pub async fn launch(config: &LaunchConfig, timeout: Duration) -> Result<Self, LaunchFailure> {
        let chrome_path = find_chromium(config.chromium_path.as_deref()).ok_or_else(|| {
            LaunchFailure::ExecutableNotFound(
                "no Chromium binary found (run `unitwatch install`)".to_string(),
            )
        })?;

        let profile_dir = config
            .profile_root
            .join(format!("{PROFILE_PREFIX}{}", uuid::Uuid::new_v4()));

        let browser_config = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&profile_dir)
            .launch_timeout(timeout)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(|e| LaunchFailure::Other(format!("failed to build browser config: {e}")))?;

        debug!(chrome = %chrome_path.display(), profile = %profile_dir.display(), "launching Chromium");

        let launched = tokio::time::timeout(timeout, Browser::launch(browser_config)).await;
        let (browser, mut handler) = match launched {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                remove_profile_dir(&profile_dir).await;
                return Err(LaunchFailure::from_cdp(&e));
            }
            Err(_) => {
                remove_profile_dir(&profile_dir).await;
                return Err(LaunchFailure::Timeout(format!(
                    "no DevTools endpoint within {}s",
                    timeout.as_secs()
                )));
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            handler,
            profile_dir,
        })
    }
}

async fn remove_profile_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(dir = %dir.display(), error = %e, "failed to remove browser profile");
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        Ok(Box::new(ChromiumContext { page }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let Self {
            mut browser,
            handler,
            profile_dir,
        } = *self;

        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        remove_profile_dir(&profile_dir).await;

        closed.map(|_| ()).context("failed to close Chromium")
    }
}

/// A single Chromium tab.
pub struct ChromiumContext {
    page: Page,
}

impl ChromiumContext {
    async fn eval<T: DeserializeOwned>(&self, script: String, timeout: Duration) -> Result<T> {
        let result = tokio::time::timeout(timeout, self.page.evaluate(script))
            .await
            .map_err(|_| anyhow!("script timed out after {}ms", timeout.as_millis()))?
            .context("script evaluation failed")?;
        result
            .into_value::<T>()
            .map_err(|e| anyhow!("unexpected script result: {e:?}"))
    }

    async fn ready_state(&self) -> Option<String> {
        self.eval::<String>("document.readyState".to_string(), POLL_INTERVAL * 4)
            .await
            .ok()
    }

    async fn wait_for_dom(&self) -> Result<()> {
        loop {
            if let Some(state) = self.ready_state().await {
                if state == "interactive" || state == "complete" {
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Page loaded and no new resource entries for `IDLE_WINDOW`.
    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut last_count: Option<u64> = None;
        let mut stable_since = Instant::now();
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let count = self
                .eval::<u64>(
                    "performance.getEntriesByType('resource').length".to_string(),
                    POLL_INTERVAL * 4,
                )
                .await
                .ok();
            let complete = self.ready_state().await.as_deref() == Some("complete");

            if complete && count.is_some() && count == last_count {
                if stable_since.elapsed() >= IDLE_WINDOW {
                    return Ok(());
                }
            } else {
                stable_since = Instant::now();
            }
            last_count = count;
        }
    }

    async fn navigate_with(&self, url: &str, wait: WaitUntil) -> Result<()> {
        match wait {
            WaitUntil::DomContentLoaded => {
                let response = self
                    .page
                    .execute(NavigateParams::new(url))
                    .await
                    .context("navigation request failed")?;
                if let Some(error) = response.result.error_text.as_deref() {
                    bail!("navigation error: {error}");
                }
                self.wait_for_dom().await
            }
            WaitUntil::Load => {
                self.page.goto(url).await.context("page load failed")?;
                Ok(())
            }
            WaitUntil::NetworkIdle => {
                self.page.goto(url).await.context("page load failed")?;
                self.wait_for_network_idle().await
            }
        }
    }
}

/// Quote a string as a JS literal.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationResult> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.navigate_with(url, wait)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.context(format!("navigation to {url} failed ({wait})"))),
            Err(_) => bail!(
                "navigation to {url} timed out after {}ms waiting for {wait}",
                timeout.as_millis()
            ),
        }

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let script = format!("document.querySelectorAll({}).length", js_str(selector));
        self.eval(script, SCRIPT_TIMEOUT).await
    }

    async fn scroll_into_view(&self, selector: &str, index: usize, timeout: Duration) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{index}]; \
             if (!el) return false; el.scrollIntoView({{ block: 'center' }}); return true; }})()",
            js_str(selector)
        );
        if !self.eval::<bool>(script, timeout).await? {
            bail!("no element {index} for selector {selector}");
        }
        Ok(())
    }

    async fn text_at(&self, selector: &str, index: usize, timeout: Duration) -> Result<String> {
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{index}]; \
             return el ? (el.innerText || '') : null; }})()",
            js_str(selector)
        );
        self.eval::<Option<String>>(script, timeout)
            .await?
            .ok_or_else(|| anyhow!("no element {index} for selector {selector}"))
    }

    async fn inner_text_at(
        &self,
        selector: &str,
        index: usize,
        inner: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({})[{index}]; \
             if (!el) return [false, null]; const sub = el.querySelector({}); \
             return [true, sub ? (sub.innerText || '') : null]; }})()",
            js_str(selector),
            js_str(inner)
        );
        let (found, text) = self.eval::<(bool, Option<String>)>(script, timeout).await?;
        if !found {
            bail!("no element {index} for selector {selector}");
        }
        Ok(text)
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(el => el.innerText || '')",
            js_str(selector)
        );
        self.eval(script, SCRIPT_TIMEOUT).await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let clicked = tokio::time::timeout(timeout, async {
            let element = self.page.find_element(selector).await?;
            element.click().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;
        match clicked {
            Ok(result) => result.with_context(|| format!("failed to click {selector}")),
            Err(_) => bail!("click on {selector} timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn body_text(&self) -> Result<String> {
        self.eval(
            "document.body ? document.body.innerText : ''".to_string(),
            SCRIPT_TIMEOUT,
        )
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close page")
    }
}
