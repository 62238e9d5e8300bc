//! Webhook notification sink.
//!
//! Every notification is one JSON `POST`:
//!
//! ```json
//! {"event": "new_units", "count": 1, "units": [{"unit_number": "WEST-641", ...}]}
//! {"event": "error", "message": "...", "context": {"run_id": "...", ...}}
//! ```

use super::{ErrorContext, NotificationSink};
use crate::types::Apartment;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts notifications to a fixed URL.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(concat!("unitwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("webhook request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("webhook {} returned {status}", self.url);
        }
        debug!(url = %self.url, %status, "webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify_new(&self, units: &[Apartment]) -> Result<()> {
        self.post(&json!({
            "event": "new_units",
            "count": units.len(),
            "units": units,
        }))
        .await
    }

    async fn notify_error(&self, message: &str, context: &ErrorContext) {
        let body = json!({
            "event": "error",
            "message": message,
            "context": context,
        });
        if let Err(e) = self.post(&body).await {
            warn!(error = %format!("{e:#}"), "failed to deliver error notification");
        }
    }
}
