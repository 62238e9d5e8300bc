//! Unit extraction from a floorplan detail page.

use crate::config::{NavigationConfig, SiteProfile};
use crate::dedup::{DedupKey, SeenKeys};
use crate::extraction::grammar::{self, UnitTriple};
use crate::navigation::{self, LoadStrategy};
use crate::renderer::RenderContext;
use crate::types::{FloorplanCandidate, RawUnit};
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Pause after opening the availability panel so its content can render.
const DISCLOSURE_SETTLE: Duration = Duration::from_millis(300);

/// Pulls unit listings off detail pages for one site.
pub struct UnitExtractor<'a> {
    site: &'a SiteProfile,
    navigation: &'a NavigationConfig,
}

impl<'a> UnitExtractor<'a> {
    pub fn new(site: &'a SiteProfile, navigation: &'a NavigationConfig) -> Self {
        Self { site, navigation }
    }

    /// Extract the units listed for `floorplan`, skipping any whose key is
    /// already in `seen` and recording the rest there.
    ///
    /// Never fails: any error is logged and yields no units.
    #[instrument(skip_all, fields(floorplan = %floorplan.title, url = %floorplan.detail_url))]
    pub async fn extract(
        &self,
        page: &mut dyn RenderContext,
        floorplan: &FloorplanCandidate,
        seen: &mut SeenKeys,
    ) -> Vec<RawUnit> {
        let triples = match self.collect_triples(page, &floorplan.detail_url).await {
            Ok(triples) => triples,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "unit extraction failed");
                return Vec::new();
            }
        };

        let found = triples.len();
        let units: Vec<RawUnit> = triples
            .into_iter()
            .filter(|t| {
                let key = DedupKey::new(
                    &floorplan.title,
                    &t.unit_number,
                    &t.rent_text,
                    &t.availability_text,
                );
                if seen.is_new(key.clone()) {
                    return true;
                }
                debug!(key = key.as_str(), "skipping repeated unit");
                false
            })
            .map(|t| RawUnit {
                unit_number: t.unit_number,
                rent_text: t.rent_text,
                availability_text: t.availability_text,
                floorplan_name: floorplan.title.clone(),
                floorplan_url: floorplan.detail_url.clone(),
                bedroom_count: floorplan.bedroom_count,
            })
            .collect();

        info!(found, emitted = units.len(), "extracted units");
        units
    }

    async fn collect_triples(
        &self,
        page: &mut dyn RenderContext,
        url: &str,
    ) -> Result<Vec<UnitTriple>> {
        navigation::load(page, url, &LoadStrategy::network_idle(self.navigation.idle_timeout))
            .await?;

        self.open_disclosure(page).await;

        let from_containers = self.scan_containers(page).await?;
        if !from_containers.is_empty() {
            return Ok(from_containers);
        }

        let body = page.body_text().await?;
        let from_body = grammar::scan_page_text(&body);
        debug!(triples = from_body.len(), "fell back to whole-page scan");
        Ok(from_body)
    }

    /// Click the first availability control present. Failure is not fatal.
    async fn open_disclosure(&self, page: &dyn RenderContext) {
        for selector in &self.site.disclosure_selectors {
            match page.exists(selector).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!(%selector, error = %format!("{e:#}"), "disclosure lookup failed");
                    continue;
                }
            }
            match page.click(selector, self.navigation.element_timeout).await {
                Ok(()) => {
                    debug!(%selector, "opened availability panel");
                    tokio::time::sleep(DISCLOSURE_SETTLE).await;
                }
                Err(e) => warn!(%selector, error = %format!("{e:#}"), "availability click failed"),
            }
            return;
        }
    }

    /// Tokenize candidate containers; stop at the first selector that yields units.
    async fn scan_containers(&self, page: &dyn RenderContext) -> Result<Vec<UnitTriple>> {
        for selector in &self.site.container_selectors {
            let texts = page.texts(selector).await?;
            let triples: Vec<UnitTriple> = texts
                .iter()
                .filter(|text| grammar::is_unit_container(text))
                .flat_map(|text| grammar::extract_triples(text))
                .collect();
            debug!(%selector, containers = texts.len(), triples = triples.len(), "scanned containers");
            if !triples.is_empty() {
                return Ok(triples);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::static_page::{StaticContext, StaticSite};
    use crate::renderer::{NavigationResult, WaitUntil};
    use std::sync::Arc;

    const URL: &str = "https://apts.test/floorplans/the-dellwood";

    fn candidate() -> FloorplanCandidate {
        FloorplanCandidate {
            title: "The Dellwood".into(),
            detail_url: URL.into(),
            bedroom_count: 1,
        }
    }

    async fn run(site: StaticSite, seen: &mut SeenKeys) -> Vec<RawUnit> {
        let profile = SiteProfile::new("https://apts.test");
        let nav = NavigationConfig::default();
        let mut page = StaticContext::new(Arc::new(site));
        UnitExtractor::new(&profile, &nav)
            .extract(&mut page, &candidate(), seen)
            .await
    }

    #[tokio::test]
    async fn test_repeated_block_yields_one_unit() {
        let listing = "<span>#WEST-641</span> <span>Starting at $1,993</span> <span>Available Sep 28</span>";
        let revealed = format!(
            r#"<div class="availability-dropdown"><p>{listing}</p><p>{listing}</p><p>{listing}</p></div>"#
        );
        let site = StaticSite::new()
            .page(URL, r#"<button class="availability-toggle">Show availability</button>"#)
            .reveal(URL, ".availability-toggle", revealed);

        let mut seen = SeenKeys::new();
        let units = run(site, &mut seen).await;

        assert_eq!(
            units,
            vec![RawUnit {
                unit_number: "WEST-641".into(),
                rent_text: "$1,993".into(),
                availability_text: "Available Sep 28".into(),
                floorplan_name: "The Dellwood".into(),
                floorplan_url: URL.into(),
                bedroom_count: 1,
            }]
        );
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_first_productive_selector_wins() {
        // `.unit-details` comes before `.unit-info` in the scan order.
        let site = StaticSite::new().page(
            URL,
            r#"<div class="unit-details">#EAST-101 $1,400 Available Now</div>
               <div class="unit-info">#EAST-999 $9,999 Available Now</div>
               <div class="promo">Units from $1,200</div>"#,
        );
        let units = run(site, &mut SeenKeys::new()).await;
        let numbers: Vec<&str> = units.iter().map(|u| u.unit_number.as_str()).collect();
        assert_eq!(numbers, vec!["EAST-101"]);
    }

    #[tokio::test]
    async fn test_body_fallback() {
        let site = StaticSite::new().page(
            URL,
            "<main><p>NORTH-12 Starting at $1,650 Available 10/15</p></main>",
        );
        let units = run(site, &mut SeenKeys::new()).await;
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_number, "NORTH-12");
        assert_eq!(units[0].availability_text, "Available 10/15");
    }

    #[tokio::test]
    async fn test_seen_keys_span_calls() {
        let html = r#"<div class="unit-details">#EAST-101 $1,400 Available Now</div>"#;
        let mut seen = SeenKeys::new();
        assert_eq!(run(StaticSite::new().page(URL, html), &mut seen).await.len(), 1);
        assert!(run(StaticSite::new().page(URL, html), &mut seen).await.is_empty());
    }

    #[tokio::test]
    async fn test_navigation_failure_yields_nothing() {
        let mut seen = SeenKeys::new();
        assert!(run(StaticSite::new(), &mut seen).await.is_empty());
        assert!(seen.is_empty());
    }

    /// Detail page whose availability control is present but cannot be clicked.
    struct StuckDisclosure {
        containers: Vec<String>,
        body: String,
        clicks: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RenderContext for StuckDisclosure {
        async fn navigate(&mut self, url: &str, _: WaitUntil, _: Duration) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }
        async fn count(&self, selector: &str) -> Result<usize> {
            Ok(usize::from(selector == ".availability-toggle"))
        }
        async fn scroll_into_view(&self, _: &str, _: usize, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn text_at(&self, _: &str, _: usize, _: Duration) -> Result<String> {
            Ok(String::new())
        }
        async fn inner_text_at(&self, _: &str, _: usize, _: &str, _: Duration) -> Result<Option<String>> {
            Ok(None)
        }
        async fn texts(&self, selector: &str) -> Result<Vec<String>> {
            if selector == ".unit-details" {
                return Ok(self.containers.clone());
            }
            Ok(Vec::new())
        }
        async fn click(&self, selector: &str, _: Duration) -> Result<()> {
            self.clicks.lock().unwrap().push(selector.to_string());
            anyhow::bail!("element {selector} is not clickable")
        }
        async fn body_text(&self) -> Result<String> {
            Ok(self.body.clone())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn stuck(containers: &[&str], body: &str) -> StuckDisclosure {
        StuckDisclosure {
            containers: containers.iter().map(|c| c.to_string()).collect(),
            body: body.to_string(),
            clicks: std::sync::Mutex::new(Vec::new()),
        }
    }

    async fn extract_from(page: &mut StuckDisclosure) -> Vec<RawUnit> {
        let profile = SiteProfile::new("https://apts.test");
        let nav = NavigationConfig::default();
        UnitExtractor::new(&profile, &nav)
            .extract(page, &candidate(), &mut SeenKeys::new())
            .await
    }

    #[tokio::test]
    async fn test_failed_click_still_reads_containers() {
        let mut page = stuck(&["#EAST-101 $1,400 Available Now"], "");

        let units = extract_from(&mut page).await;

        assert_eq!(*page.clicks.lock().unwrap(), vec![".availability-toggle"]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_number, "EAST-101");
        assert_eq!(units[0].rent_text, "$1,400");
    }

    #[tokio::test]
    async fn test_failed_click_falls_back_to_body() {
        let mut page = stuck(&[], "Floorplan NORTH-12 Starting at $1,650 Available 10/15");

        let units = extract_from(&mut page).await;

        assert_eq!(page.clicks.lock().unwrap().len(), 1);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_number, "NORTH-12");
    }
}
