//! Data model shared by the discovery, extraction and reconciliation stages.
//!
//! Everything here lives for one run. Persistence is the record store's job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A floorplan card from the index page that passed the studio/1BR and price filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorplanCandidate {
    /// Display title as shown on the card (e.g. "The Dellwood").
    pub title: String,
    /// Detail page URL derived from the title.
    pub detail_url: String,
    /// 0 for studios, otherwise the parsed bedroom count.
    pub bedroom_count: u32,
}

/// A unit as scraped from a detail page, before any parsing.
///
/// `unit_number` is never empty; rent and availability keep their page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUnit {
    pub unit_number: String,
    pub rent_text: String,
    pub availability_text: String,
    pub floorplan_name: String,
    pub floorplan_url: String,
    pub bedroom_count: u32,
}

/// A unit after rent and availability parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    pub unit_number: String,
    pub floorplan_name: String,
    pub bedroom_count: u32,
    /// Whole currency units, separators stripped. 0 when unparseable.
    pub rent: u32,
    pub availability_date: Option<NaiveDate>,
}

/// An apartment as held by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUnit {
    #[serde(flatten)]
    pub apartment: Apartment,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Final status of a run, as written to the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    pub units_found: usize,
    pub new_units: usize,
    pub errors: Vec<String>,
    pub status: RunStatus,
}
