//! `unitwatch inspect`: run unit extraction over a saved detail page.
//!
//! Used to re-check the site's listing grammar without a browser.

use super::output;
use crate::config::{NavigationConfig, SiteProfile};
use crate::dedup::SeenKeys;
use crate::extraction::discover::classify_bedrooms;
use crate::extraction::units::UnitExtractor;
use crate::normalize;
use crate::renderer::static_page::{StaticContext, StaticSite};
use crate::types::{Apartment, FloorplanCandidate};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const INSPECT_URL: &str = "file:///inspect/detail.html";

/// Extract the units listed in `html` as if it were `floorplan`'s detail page.
pub async fn inspect_html(
    html: &str,
    floorplan: &str,
    site: &SiteProfile,
    today: NaiveDate,
) -> Vec<Apartment> {
    let static_site = Arc::new(StaticSite::new().page(INSPECT_URL, html));
    let mut page = StaticContext::new(static_site);
    let candidate = FloorplanCandidate {
        title: floorplan.to_string(),
        detail_url: INSPECT_URL.to_string(),
        bedroom_count: classify_bedrooms(floorplan),
    };

    let navigation = NavigationConfig::default();
    let extractor = UnitExtractor::new(site, &navigation);
    let raw = extractor
        .extract(&mut page, &candidate, &mut SeenKeys::new())
        .await;
    normalize::collate(&raw, today)
}

pub async fn run(path: &Path, floorplan: &str, site: &SiteProfile) -> Result<()> {
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let units = inspect_html(&html, floorplan, site, Local::now().date_naive()).await;

    if output::is_json() {
        output::print_json(&json!({
            "file": path.display().to_string(),
            "floorplan": floorplan,
            "count": units.len(),
            "units": units,
        }));
        return Ok(());
    }

    println!("{}: {} unit(s) for {floorplan}", path.display(), units.len());
    for unit in &units {
        let available = unit
            .availability_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<12} ${:<6} {available}", unit.unit_number, unit.rent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inspect_saved_page() {
        let html = r#"<section class="availability">
            <div class="unit-details">#WEST-641 Starting at $1,993 Available Sep 28</div>
            <div class="unit-details">#WEST-641 Starting at $1,993 Available Sep 28</div>
            <div class="unit-details">#EAST-210 Starting at $2,040 Available Now</div>
        </section>"#;
        let today = NaiveDate::from_ymd_opt(2026, 8, 14).unwrap();

        let units = inspect_html(html, "The Dellwood", &SiteProfile::new(""), today).await;

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].unit_number, "WEST-641");
        assert_eq!(units[0].rent, 1993);
        assert_eq!(units[0].availability_date, NaiveDate::from_ymd_opt(2026, 9, 28));
        assert_eq!(units[1].availability_date, Some(today));
    }

    #[tokio::test]
    async fn test_inspect_page_without_units() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 14).unwrap();
        let units = inspect_html("<p>No availability</p>", "The Dellwood", &SiteProfile::new(""), today).await;
        assert!(units.is_empty());
    }
}
