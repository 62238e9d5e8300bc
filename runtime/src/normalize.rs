//! Rent and availability parsing, and final collation of a run's units.
//!
//! Parse failures never surface as errors: an unreadable rent becomes 0 and
//! an unreadable date becomes `None`.

use crate::dedup::{DedupKey, SeenKeys};
use crate::types::{Apartment, RawUnit};
use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*").expect("amount regex is valid"))
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?",
            r"|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})\b"
        ))
            .expect("month-day regex is valid")
    })
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?\b").expect("numeric date regex is valid")
    })
}

fn immediate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(now|immediately|today)\b").expect("immediate regex is valid"))
}

/// Whole currency units in a price string: `"$1,991"` is 1991.
/// Cents are dropped; anything unparseable is 0.
pub fn parse_rent(text: &str) -> u32 {
    amount_re()
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// Date named by an availability phrase, in the current local year.
pub fn parse_availability(text: &str) -> Option<NaiveDate> {
    parse_availability_on(text, Local::now().date_naive())
}

/// [`parse_availability`] relative to a fixed `today`.
///
/// Accepts `Month Day` and `M/D` (an explicit `/YY` or `/YYYY` wins over the
/// current year). `Now`, `Today` and `Immediately` mean `today`.
pub fn parse_availability_on(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(c) = month_day_re().captures(text) {
        let month = month_number(c[1].get(..3)?)?;
        let day: u32 = c[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(today.year(), month, day);
    }

    if let Some(c) = numeric_date_re().captures(text) {
        let month: u32 = c[1].parse().ok()?;
        let day: u32 = c[2].parse().ok()?;
        let year = match c.get(3) {
            Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().ok()?,
            Some(y) => y.as_str().parse().ok()?,
            None => today.year(),
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if immediate_re().is_match(text) {
        return Some(today);
    }

    None
}

fn month_number(abbrev: &str) -> Option<u32> {
    let n = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// Parse one raw unit.
pub fn normalize(raw: &RawUnit, today: NaiveDate) -> Apartment {
    Apartment {
        unit_number: raw.unit_number.clone(),
        floorplan_name: raw.floorplan_name.clone(),
        bedroom_count: raw.bedroom_count,
        rent: parse_rent(&raw.rent_text),
        availability_date: parse_availability_on(&raw.availability_text, today),
    }
}

/// Normalize a run's units, dropping repeats of the same raw tuple.
///
/// This is the second dedup pass. Identity is the raw text, so two units
/// that only normalize to the same values are both kept.
pub fn collate(raw_units: &[RawUnit], today: NaiveDate) -> Vec<Apartment> {
    let mut seen = SeenKeys::new();
    let apartments: Vec<Apartment> = raw_units
        .iter()
        .filter(|raw| {
            seen.is_new(DedupKey::new(
                &raw.floorplan_name,
                &raw.unit_number,
                &raw.rent_text,
                &raw.availability_text,
            ))
        })
        .map(|raw| normalize(raw, today))
        .collect();

    let dropped = raw_units.len() - apartments.len();
    if dropped > 0 {
        debug!(dropped, "collation dropped repeated units");
    }
    apartments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 14).unwrap()
    }

    fn raw(floorplan: &str, unit: &str, rent: &str, avail: &str) -> RawUnit {
        RawUnit {
            unit_number: unit.into(),
            rent_text: rent.into(),
            availability_text: avail.into(),
            floorplan_name: floorplan.into(),
            floorplan_url: format!("https://apts.test/floorplans/the-{}", floorplan.to_lowercase()),
            bedroom_count: 1,
        }
    }

    #[test]
    fn test_parse_rent() {
        assert_eq!(parse_rent("$1,991"), 1991);
        assert_eq!(parse_rent("invalid"), 0);
        assert_eq!(parse_rent("$ 12,500.75"), 12500);
        assert_eq!(parse_rent(""), 0);
        assert_eq!(parse_rent("$99,999,999,999"), 0);
    }

    #[test]
    fn test_parse_availability_forms() {
        let sep28 = NaiveDate::from_ymd_opt(2026, 9, 28);
        assert_eq!(parse_availability_on("Available Sep 28", today()), sep28);
        assert_eq!(parse_availability_on("9/28", today()), sep28);
        assert_eq!(parse_availability_on("Available September 28", today()), sep28);
        assert_eq!(parse_availability_on("Available 9/28/27", today()), NaiveDate::from_ymd_opt(2027, 9, 28));
        assert_eq!(parse_availability_on("Available Now", today()), Some(today()));
        assert_eq!(parse_availability_on("not a date", today()), None);
        assert_eq!(parse_availability_on("Available Feb 30", today()), None);
        assert_eq!(parse_availability_on("", today()), None);
    }

    #[test]
    fn test_month_must_be_spelled_out() {
        assert_eq!(parse_availability_on("Mayfair 12", today()), None);
        assert_eq!(parse_availability_on("Marketing 5", today()), None);
        assert_eq!(parse_availability_on("Available Sept. 3", today()), NaiveDate::from_ymd_opt(2026, 9, 3));
        assert_eq!(parse_availability_on("Available June 1", today()), NaiveDate::from_ymd_opt(2026, 6, 1));
    }

    #[test]
    fn test_parse_availability_uses_current_year() {
        let date = parse_availability("Available Sep 28").unwrap();
        assert_eq!((date.month(), date.day()), (9, 28));
        assert_eq!(date.year(), Local::now().year());
        assert_eq!(parse_availability("9/28"), Some(date));
    }

    #[test]
    fn test_collate_drops_exact_repeats_only() {
        let units = vec![
            raw("Aspen", "101", "$1,000", "Available Sep 1"),
            raw("Aspen", "101", "$1,000", "Available Sep 1"),
            raw("Birch", "101", "$1,000", "Available Sep 1"),
            raw("Aspen", "101", "$1,050", "Available Sep 1"),
            // Normalizes to the same date as the first, but the text differs.
            raw("Aspen", "101", "$1,000", "9/1"),
        ];
        let apartments = collate(&units, today());

        assert_eq!(apartments.len(), 4);
        assert_eq!(apartments[0].rent, 1000);
        assert_eq!(apartments[0].availability_date, NaiveDate::from_ymd_opt(2026, 9, 1));
        assert_eq!(apartments[1].floorplan_name, "Birch");
        assert_eq!(apartments[2].rent, 1050);
    }
}
