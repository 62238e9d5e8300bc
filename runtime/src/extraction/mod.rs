//! Site-specific extraction: floorplan discovery on the index page and unit
//! listings on each detail page. The textual grammar lives in [`grammar`].

pub mod discover;
pub mod grammar;
pub mod units;
