//! Notification sinks: where new units and run failures are announced.

pub mod webhook;

use crate::types::Apartment;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub use webhook::WebhookSink;

/// Where a failed run stood when it gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub run_id: String,
    pub attempts: u32,
    pub started: DateTime<Utc>,
}

/// Outbound notifications consumed by the orchestrator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Announce units that were not on record before this run.
    async fn notify_new(&self, units: &[Apartment]) -> Result<()>;

    /// Report a failed run. Delivery problems are logged, never returned.
    async fn notify_error(&self, message: &str, context: &ErrorContext);
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify_new(&self, units: &[Apartment]) -> Result<()> {
        info!(count = units.len(), "new units available");
        for unit in units {
            info!(
                unit = %unit.unit_number,
                floorplan = %unit.floorplan_name,
                bedrooms = unit.bedroom_count,
                rent = unit.rent,
                available = %unit
                    .availability_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                "new unit"
            );
        }
        Ok(())
    }

    async fn notify_error(&self, message: &str, context: &ErrorContext) {
        error!(run_id = %context.run_id, attempts = context.attempts, %message, "run failed");
    }
}
