//! Record store: where found units and run logs persist between runs.

pub mod sqlite;

use crate::types::{Apartment, PersistedUnit, RunLog};
use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::SqliteStore;

/// Persistence consumed by the orchestrator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every unit currently on record.
    async fn fetch_current(&self) -> Result<Vec<PersistedUnit>>;

    /// Insert or update units, keyed by unit number.
    async fn upsert(&self, units: &[Apartment]) -> Result<()>;

    /// Remove every unit whose number is not in `keep`. Returns how many went.
    async fn delete_except(&self, keep: &[String]) -> Result<usize>;

    async fn append_run_log(&self, log: &RunLog) -> Result<()>;
}
