//! Floorplan discovery on the index page.
//!
//! Reads every listing card, keeps studios and one-bedrooms that advertise
//! a price, and derives each card's detail URL from its title. Discovery
//! finishes the whole listing before any detail page is visited, because the
//! index renders cards lazily and leaving it loses our place.

use crate::config::SiteProfile;
use crate::renderer::RenderContext;
use crate::types::FloorplanCandidate;
use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

fn bed_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d+|one|two|three|four)\s*-?\s*(?:bed(?:room)?s?|br|bd)\b")
            .expect("bedroom count regex is valid")
    })
}

/// Bedroom count implied by a floorplan title. Studios are 0, and so is
/// anything unrecognised.
pub fn classify_bedrooms(title: &str) -> u32 {
    let lower = title.to_lowercase();
    if lower.contains("studio") {
        return 0;
    }
    let Some(c) = bed_count_re().captures(&lower) else {
        return 0;
    };
    match &c[1] {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        digits => digits.parse().unwrap_or(0),
    }
}

/// URL slug for a floorplan title: `"The Dellwood"` becomes `dellwood`.
///
/// The leading article is dropped here and re-added by the site's detail
/// path as `the-`.
pub fn slugify(title: &str) -> String {
    let lower = title.trim().to_lowercase();
    let without_article = lower.strip_prefix("the ").unwrap_or(&lower);
    without_article
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// Enumerate qualifying floorplans on the index page already loaded in `page`.
///
/// A card that cannot be read is skipped. Only failing to enumerate cards at
/// all is an error.
#[instrument(skip_all, fields(selector = %site.card_selector))]
pub async fn discover(
    page: &dyn RenderContext,
    site: &SiteProfile,
    element_timeout: Duration,
) -> Result<Vec<FloorplanCandidate>> {
    let selector = site.card_selector.as_str();
    let total = page
        .count(selector)
        .await
        .context("failed to enumerate floorplan cards")?;
    info!(cards = total, "found floorplan cards");

    let mut candidates = Vec::new();
    for index in 0..total {
        if let Err(e) = page.scroll_into_view(selector, index, element_timeout).await {
            debug!(index, error = %format!("{e:#}"), "could not scroll card into view");
        }

        let title = match page
            .inner_text_at(selector, index, &site.card_title_selector, element_timeout)
            .await
        {
            Ok(Some(title)) if !title.trim().is_empty() => title.trim().to_string(),
            Ok(_) => {
                warn!(index, "floorplan card has no title, skipping");
                continue;
            }
            Err(e) => {
                warn!(index, error = %format!("{e:#}"), "failed to read card title, skipping");
                continue;
            }
        };

        let text = match page.text_at(selector, index, element_timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(index, %title, error = %format!("{e:#}"), "failed to read card text, skipping");
                continue;
            }
        };

        let bedroom_count = classify_bedrooms(&title);
        if bedroom_count > 1 {
            debug!(%title, bedroom_count, "skipping floorplan with too many bedrooms");
            continue;
        }
        if !text.contains(site.price_marker.as_str()) {
            debug!(%title, "skipping floorplan without a listed price");
            continue;
        }

        let detail_url = match site.floorplan_url(&slugify(&title)) {
            Ok(url) => url,
            Err(e) => {
                warn!(%title, error = %format!("{e:#}"), "could not build detail URL, skipping");
                continue;
            }
        };

        debug!(%title, %detail_url, bedroom_count, "qualifying floorplan");
        candidates.push(FloorplanCandidate {
            title,
            detail_url,
            bedroom_count,
        });
    }

    info!(qualifying = candidates.len(), "floorplan discovery finished");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::static_page::{StaticContext, StaticSite};
    use crate::renderer::{NavigationResult, WaitUntil};
    use std::sync::Arc;

    #[test]
    fn test_classify_bedrooms() {
        assert_eq!(classify_bedrooms("The Aspen Studio"), 0);
        assert_eq!(classify_bedrooms("1 Bedroom Deluxe"), 1);
        assert_eq!(classify_bedrooms("2 Bed / 2 Bath"), 2);
        assert_eq!(classify_bedrooms("One Bedroom Loft"), 1);
        assert_eq!(classify_bedrooms("Three-Bedroom Townhome"), 3);
        assert_eq!(classify_bedrooms("The Birch 2BR"), 2);
        assert_eq!(classify_bedrooms("The Dellwood"), 0);
    }

    #[test]
    fn test_classify_bedrooms_needs_whole_numbers_and_words() {
        assert_eq!(classify_bedrooms("11 Bedroom"), 11);
        assert_eq!(classify_bedrooms("12 Bedroom Penthouse"), 12);
        assert_eq!(classify_bedrooms("Unit 201 Bedford"), 0);
        assert_eq!(classify_bedrooms("Someone Bedazzled"), 0);
        assert_eq!(classify_bedrooms("1 Bd Garden"), 1);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Dellwood"), "dellwood");
        assert_eq!(slugify("  The   Grand  Oak  "), "grand-oak");
        assert_eq!(slugify("1 Bedroom Deluxe!"), "1-bedroom-deluxe");
        assert_eq!(slugify("Théâtre & Co."), "thtre--co");
        // Only a leading article is dropped.
        assert_eq!(slugify("Over The Park"), "over-the-park");
    }

    async fn discover_html(html: &str) -> Vec<FloorplanCandidate> {
        let site = Arc::new(StaticSite::new().page("https://apts.test/floorplans", html));
        let mut page = StaticContext::new(site);
        page.navigate(
            "https://apts.test/floorplans",
            WaitUntil::Load,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let profile = SiteProfile::new("https://apts.test");
        discover(&page, &profile, Duration::from_secs(1)).await.unwrap()
    }

    #[tokio::test]
    async fn test_filters_by_bedrooms_and_price() {
        let candidates = discover_html(
            r#"<div class="floorplan-card"><h3>1 Bedroom Deluxe</h3><p>Starting at $1,500</p></div>
               <div class="floorplan-card"><h3>2 Bedroom Luxury</h3><p>Starting at $2,500</p></div>"#,
        )
        .await;

        assert_eq!(
            candidates,
            vec![FloorplanCandidate {
                title: "1 Bedroom Deluxe".into(),
                detail_url: "https://apts.test/floorplans/the-1-bedroom-deluxe".into(),
                bedroom_count: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_skips_unpriced_and_untitled_cards() {
        let candidates = discover_html(
            r#"<div class="floorplan-card"><h3>The Aspen Studio</h3><p>Call for details</p></div>
               <div class="floorplan-card"><p>Studio from $1,200</p></div>
               <div class="fp-card"><h2>The Dellwood</h2><p>Studio</p><p>From $1,350</p></div>"#,
        )
        .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "The Dellwood");
        assert_eq!(candidates[0].bedroom_count, 0);
        assert_eq!(
            candidates[0].detail_url,
            "https://apts.test/floorplans/the-dellwood"
        );
    }

    #[tokio::test]
    async fn test_every_candidate_qualifies() {
        let candidates = discover_html(
            r#"<div class="floorplan-card"><h3>Studio A</h3><p>$1,100</p></div>
               <div class="floorplan-card"><h3>One Bedroom B</h3><p>$1,300</p></div>
               <div class="floorplan-card"><h3>Two Bedroom C</h3><p>$1,900</p></div>
               <div class="floorplan-card"><h3>3 Bed D</h3><p>$2,400</p></div>"#,
        )
        .await;

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.bedroom_count <= 1));
    }

    /// Index page whose cards can fail individually.
    struct UnreliableCards {
        cards: Vec<(&'static str, &'static str)>,
        title_errors: Vec<usize>,
        text_errors: Vec<usize>,
    }

    #[async_trait::async_trait]
    impl RenderContext for UnreliableCards {
        async fn navigate(&mut self, url: &str, _: WaitUntil, _: Duration) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }
        async fn count(&self, _: &str) -> Result<usize> {
            Ok(self.cards.len())
        }
        async fn scroll_into_view(&self, _: &str, _: usize, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn text_at(&self, _: &str, index: usize, _: Duration) -> Result<String> {
            if self.text_errors.contains(&index) {
                anyhow::bail!("timed out reading card {index}");
            }
            Ok(self.cards[index].1.to_string())
        }
        async fn inner_text_at(&self, _: &str, index: usize, _: &str, _: Duration) -> Result<Option<String>> {
            if self.title_errors.contains(&index) {
                anyhow::bail!("timed out reading title {index}");
            }
            Ok(Some(self.cards[index].0.to_string()))
        }
        async fn texts(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn click(&self, _: &str, _: Duration) -> Result<()> {
            Ok(())
        }
        async fn body_text(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreadable_cards_are_skipped() {
        let page = UnreliableCards {
            cards: vec![
                ("Studio 0", "$900"),
                ("Studio 1", "$1,000"),
                ("Studio 2", "$1,100"),
                ("One Bedroom 3", "$1,200"),
            ],
            title_errors: vec![0],
            text_errors: vec![2],
        };
        let profile = SiteProfile::new("https://apts.test");

        let candidates = discover(&page, &profile, Duration::from_millis(10)).await.unwrap();

        let titles: Vec<&str> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Studio 1", "One Bedroom 3"]);
    }
}
