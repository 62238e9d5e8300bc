//! Token grammar for unit listings.
//!
//! Detail pages describe units in loosely structured text such as
//! `#WEST-641 Starting at $1,993 Available Sep 28`. This module turns such
//! text into `(unit, price, availability)` triples. It is pure and never
//! touches the DOM, so a markup change on the site only means a change here.
//!
//! Unit numbers come in two shapes. Long codes (three or more capital
//! letters, optional hyphen, digits, e.g. `WEST-641` or `NORTH101`) name the
//! physical unit. Short codes (`#204`, `Unit B2`) are sometimes a column or
//! unit-type label, so they are only used when no long code is present.

use regex::Regex;
use std::sync::OnceLock;

/// One unit as read from text, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTriple {
    pub unit_number: String,
    pub rent_text: String,
    pub availability_text: String,
}

const MONTHS: &str = concat!(
    r"(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?",
    r"|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?"
);

fn long_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#?\b([A-Z]{3,}-?\d{1,5}[A-Z]?)\b").expect("long unit regex is valid")
    })
}

fn short_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:#\s*|\b[Uu]nit\s+#?\s*)([A-Z]{0,2}-?\d{1,5}[A-Z]?)\b")
            .expect("short unit regex is valid")
    })
}

fn unit_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#|(?i)\bunit\b").expect("unit marker regex is valid"))
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s?\d+(?:,\d{3})*(?:\.\d{2})?").expect("price regex is valid")
    })
}

fn availability_pattern() -> String {
    format!(r"(?i:available)\s*:?\s*(?:(?i:now|immediately|today)|{MONTHS}\s+\d{{1,2}}|\d{{1,2}}/\d{{1,2}}(?:/\d{{2,4}})?)")
}

fn availability_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&availability_pattern()).expect("availability regex is valid"))
}

/// Unit code, then a price within a short window, then optionally a date.
fn listing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"#?\b([A-Z]{{3,}}-?\d{{1,5}}[A-Z]?)\b[^#$]{{0,120}}?(\$\s?\d+(?:,\d{{3}})*(?:\.\d{{2}})?)(?:[^#$]{{0,120}}?({}))?",
            availability_pattern()
        );
        Regex::new(&pattern).expect("listing regex is valid")
    })
}

/// Whether `text` mentions a unit (`#` or the word "unit").
pub fn has_unit_marker(text: &str) -> bool {
    unit_marker_re().is_match(text)
}

/// Containers worth tokenizing mention a unit and a price.
pub fn is_unit_container(text: &str) -> bool {
    has_unit_marker(text) && text.contains('$')
}

/// Unit numbers in document order, long codes preferred over short ones.
pub fn unit_tokens(text: &str) -> Vec<String> {
    let long: Vec<String> = long_unit_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    if !long.is_empty() {
        return long;
    }
    short_unit_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Price strings as written, e.g. `$1,993`.
pub fn price_tokens(text: &str) -> Vec<String> {
    price_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Availability phrases as written, e.g. `Available Sep 28`.
pub fn availability_tokens(text: &str) -> Vec<String> {
    availability_re()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Pair tokens by position. A unit without a price or date at its own index
/// takes the first one, which covers widgets that show one shared date for
/// every unit. Missing tokens become empty strings.
pub fn pair_tokens(units: &[String], prices: &[String], dates: &[String]) -> Vec<UnitTriple> {
    units
        .iter()
        .filter(|u| !u.is_empty())
        .enumerate()
        .map(|(i, unit)| UnitTriple {
            unit_number: unit.clone(),
            rent_text: prices.get(i).or(prices.first()).cloned().unwrap_or_default(),
            availability_text: dates.get(i).or(dates.first()).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Tokenize one container's text and pair the results.
pub fn extract_triples(text: &str) -> Vec<UnitTriple> {
    pair_tokens(
        &unit_tokens(text),
        &price_tokens(text),
        &availability_tokens(text),
    )
}

/// Scan free page text with the combined listing pattern.
pub fn scan_page_text(text: &str) -> Vec<UnitTriple> {
    listing_re()
        .captures_iter(text)
        .map(|c| UnitTriple {
            unit_number: c[1].to_string(),
            rent_text: c[2].to_string(),
            availability_text: c
                .get(3)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}
