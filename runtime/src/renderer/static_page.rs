//! Renderer over pre-fetched HTML.
//!
//! Serves pages from an in-memory [`StaticSite`] so the discovery and
//! extraction stages can run without a browser: against fixtures in tests,
//! and against saved detail pages in `unitwatch inspect`.
//!
//! `scraper::Html` is `!Send`, so each operation parses the current document
//! inside a synchronous helper and returns owned values.

use super::{NavigationResult, RenderContext, Renderer, WaitUntil};
use crate::live::launch::{LaunchFailure, Launcher};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StaticPage {
    html: String,
    /// `(selector, html)`: clicking `selector` swaps the document for `html`.
    reveals: Vec<(String, String)>,
}

/// A fixed set of pages keyed by URL.
#[derive(Debug, Default)]
pub struct StaticSite {
    pages: HashMap<String, StaticPage>,
    /// Remaining forced navigation failures per URL.
    failures: Mutex<HashMap<String, usize>>,
    visits: Mutex<Vec<String>>,
}

fn page_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`.
    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(
            page_key(url),
            StaticPage {
                html: html.into(),
                reveals: Vec::new(),
            },
        );
        self
    }

    /// Clicking `selector` on the page at `url` replaces it with `html`.
    pub fn reveal(mut self, url: &str, selector: &str, html: impl Into<String>) -> Self {
        if let Some(page) = self.pages.get_mut(&page_key(url)) {
            page.reveals.push((selector.to_string(), html.into()));
        }
        self
    }

    /// The first `times` navigations to `url` fail.
    pub fn flaky(self, url: &str, times: usize) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(page_key(url), times);
        }
        self
    }

    /// Every URL navigated to so far, in order.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn fetch(&self, url: &str) -> Result<StaticPage> {
        let key = page_key(url);
        if let Ok(mut visits) = self.visits.lock() {
            visits.push(key.clone());
        }
        if let Ok(mut failures) = self.failures.lock() {
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    bail!("connection reset while loading {url}");
                }
            }
        }
        self.pages
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("HTTP 404 for {url}"))
    }
}

/// Renderer whose contexts all browse the same [`StaticSite`].
pub struct StaticRenderer {
    site: Arc<StaticSite>,
    shutdowns: Arc<AtomicUsize>,
}

impl StaticRenderer {
    pub fn new(site: Arc<StaticSite>) -> Self {
        Self {
            site,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Ok(Box::new(StaticContext::new(Arc::clone(&self.site))))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches [`StaticRenderer`]s over one site, counting launches and
/// shutdowns. Lets a whole run execute without a browser.
pub struct StaticLauncher {
    site: Arc<StaticSite>,
    launches: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
}

impl StaticLauncher {
    pub fn new(site: Arc<StaticSite>) -> Self {
        Self {
            site,
            launches: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for StaticLauncher {
    async fn launch(&self, _timeout: Duration) -> Result<Box<dyn Renderer>, LaunchFailure> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticRenderer {
            site: Arc::clone(&self.site),
            shutdowns: Arc::clone(&self.shutdowns),
        }))
    }

    async fn install(&self) -> Result<()> {
        Ok(())
    }

    async fn cleanup_stale(&self) -> Result<()> {
        Ok(())
    }
}

/// One tab over a [`StaticSite`].
pub struct StaticContext {
    site: Arc<StaticSite>,
    current: Mutex<Option<(String, StaticPage)>>,
}

impl StaticContext {
    pub fn new(site: Arc<StaticSite>) -> Self {
        Self {
            site,
            current: Mutex::new(None),
        }
    }

    fn html(&self) -> Result<String> {
        let current = self
            .current
            .lock()
            .map_err(|_| anyhow!("static page state poisoned"))?;
        current
            .as_ref()
            .map(|(_, page)| page.html.clone())
            .ok_or_else(|| anyhow!("no page loaded"))
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector:?}: {e:?}"))
}

/// Text content with each text node trimmed and separated by one space.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_texts(html: &str, selector: &str) -> Result<Vec<String>> {
    let sel = parse_selector(selector)?;
    let document = Html::parse_document(html);
    Ok(document.select(&sel).map(|el| element_text(&el)).collect())
}

fn select_inner_text(html: &str, selector: &str, index: usize, inner: &str) -> Result<Option<String>> {
    let sel = parse_selector(selector)?;
    let inner_sel = parse_selector(inner)?;
    let document = Html::parse_document(html);
    let el = document
        .select(&sel)
        .nth(index)
        .ok_or_else(|| anyhow!("no element {index} for selector {selector}"))?;
    Ok(el.select(&inner_sel).next().map(|sub| element_text(&sub)))
}

#[async_trait]
impl RenderContext for StaticContext {
    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitUntil,
        _timeout: Duration,
    ) -> Result<NavigationResult> {
        let page = self.site.fetch(url)?;
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("static page state poisoned"))?;
        *current = Some((url.to_string(), page));
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(select_texts(&self.html()?, selector)?.len())
    }

    async fn scroll_into_view(&self, selector: &str, index: usize, _timeout: Duration) -> Result<()> {
        if select_texts(&self.html()?, selector)?.len() <= index {
            bail!("no element {index} for selector {selector}");
        }
        Ok(())
    }

    async fn text_at(&self, selector: &str, index: usize, _timeout: Duration) -> Result<String> {
        select_texts(&self.html()?, selector)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow!("no element {index} for selector {selector}"))
    }

    async fn inner_text_at(
        &self,
        selector: &str,
        index: usize,
        inner: &str,
        _timeout: Duration,
    ) -> Result<Option<String>> {
        select_inner_text(&self.html()?, selector, index, inner)
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        select_texts(&self.html()?, selector)
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<()> {
        if select_texts(&self.html()?, selector)?.is_empty() {
            bail!("no element matches {selector}");
        }
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("static page state poisoned"))?;
        if let Some((_, page)) = current.as_mut() {
            let revealed = page
                .reveals
                .iter()
                .find(|(sel, _)| sel == selector)
                .map(|(_, html)| html.clone());
            if let Some(html) = revealed {
                page.html = html;
            }
        }
        Ok(())
    }

    async fn body_text(&self) -> Result<String> {
        Ok(select_texts(&self.html()?, "body")?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><body>
        <div class="card"><h2>The Aspen</h2><span>Studio</span><span>$1,400</span></div>
        <div class="card"><h2>The Birch</h2><span>Call for pricing</span></div>
    </body></html>"#;

    fn site() -> Arc<StaticSite> {
        Arc::new(
            StaticSite::new()
                .page("https://apts.test/floorplans", INDEX)
                .page("https://apts.test/floorplans/the-aspen", "<button class=\"toggle\">Units</button>")
                .reveal(
                    "https://apts.test/floorplans/the-aspen",
                    ".toggle",
                    "<div class=\"unit\">#A-101 $1,400</div>",
                ),
        )
    }

    #[tokio::test]
    async fn test_reads_elements_by_index() {
        let mut ctx = StaticContext::new(site());
        ctx.navigate("https://apts.test/floorplans/", WaitUntil::Load, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(ctx.count(".card").await.unwrap(), 2);
        let t = Duration::from_secs(1);
        assert_eq!(ctx.text_at(".card", 0, t).await.unwrap(), "The Aspen Studio $1,400");
        assert_eq!(
            ctx.inner_text_at(".card", 1, "h2", t).await.unwrap().as_deref(),
            Some("The Birch")
        );
        assert_eq!(ctx.inner_text_at(".card", 1, "h4", t).await.unwrap(), None);
        assert!(ctx.text_at(".card", 2, t).await.is_err());
        assert!(ctx.scroll_into_view(".card", 5, t).await.is_err());
    }

    #[tokio::test]
    async fn test_click_reveals_content() {
        let mut ctx = StaticContext::new(site());
        ctx.navigate(
            "https://apts.test/floorplans/the-aspen",
            WaitUntil::NetworkIdle,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(!ctx.exists(".unit").await.unwrap());

        ctx.click(".toggle", Duration::from_secs(1)).await.unwrap();
        assert_eq!(ctx.texts(".unit").await.unwrap(), vec!["#A-101 $1,400"]);
        assert!(ctx.click(".missing", Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_and_flaky_pages() {
        let site = Arc::new(
            StaticSite::new()
                .page("https://apts.test/floorplans", INDEX)
                .flaky("https://apts.test/floorplans", 1),
        );
        let mut ctx = StaticContext::new(Arc::clone(&site));
        let t = Duration::from_secs(1);

        assert!(ctx.navigate("https://apts.test/nope", WaitUntil::Load, t).await.is_err());
        assert!(ctx.navigate("https://apts.test/floorplans", WaitUntil::Load, t).await.is_err());
        assert!(ctx.navigate("https://apts.test/floorplans", WaitUntil::Load, t).await.is_ok());
        assert_eq!(site.visits().len(), 3);
    }

    #[tokio::test]
    async fn test_operations_require_a_page() {
        let ctx = StaticContext::new(site());
        assert!(ctx.body_text().await.is_err());
    }
}
