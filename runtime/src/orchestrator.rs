//! Run orchestration: one scrape with whole-run retries, then reconciliation
//! against the record store and notification sink.
//!
//! [`Orchestrator::run`] only scrapes. [`Orchestrator::execute`] wraps it and
//! is the single place that talks to the collaborators.

use crate::config::Config;
use crate::dedup::SeenKeys;
use crate::extraction::discover::discover;
use crate::extraction::units::UnitExtractor;
use crate::live::{BrowserSession, Launcher};
use crate::navigation::{self, LoadStrategy};
use crate::normalize;
use crate::notify::{ErrorContext, NotificationSink};
use crate::store::RecordStore;
use crate::types::{Apartment, RunLog, RunStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What one `execute()` produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub attempts: u32,
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    /// Every unit found this run.
    pub apartments: Vec<Apartment>,
    /// Units that were not on record before this run.
    pub new_units: Vec<Apartment>,
    /// Units retired because they were no longer listed.
    pub removed: usize,
    /// Collaborator failures after a successful scrape.
    pub errors: Vec<String>,
}

pub struct Orchestrator {
    config: Config,
    launcher: Arc<dyn Launcher>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn NotificationSink>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        launcher: Arc<dyn Launcher>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            launcher,
            store,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scrape the site, retrying the whole run on failure.
    pub async fn run(&self) -> Result<Vec<Apartment>> {
        self.run_counted().await.0
    }

    /// [`Self::run`], also reporting how many attempts were made.
    async fn run_counted(&self) -> (Result<Vec<Apartment>>, u32) {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut session = BrowserSession::new(
            Arc::clone(&self.launcher),
            self.config.launch.clone(),
            self.config.environment,
        );

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match self.attempt(&mut session, attempt).await {
                Ok(apartments) => {
                    session.close().await;
                    info!(attempt, units = apartments.len(), "run succeeded");
                    return (Ok(apartments), attempt);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %format!("{e:#}"), "run attempt failed");
                    session.close().await;
                    last_error = Some(e);
                    if attempt < max_attempts {
                        let delay = self.config.retry.retry_delay * attempt;
                        info!(delay_ms = delay.as_millis() as u64, "retrying run");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        session.close().await;
        let err = last_error
            .unwrap_or_else(|| anyhow!("run made no attempts"))
            .context(format!("run failed after {max_attempts} attempts"));
        error!(error = %format!("{err:#}"), "run exhausted its retries");
        (Err(err), max_attempts)
    }

    #[instrument(skip(self, session))]
    async fn attempt(&self, session: &mut BrowserSession, attempt: u32) -> Result<Vec<Apartment>> {
        let site = &self.config.site;
        let nav = &self.config.navigation;
        let index_url = site.index_url()?;

        let page = session.open().await?;
        navigation::load(page, &index_url, &LoadStrategy::default_ladder(nav)).await?;

        let candidates = discover(page, site, nav.element_timeout).await?;

        let extractor = UnitExtractor::new(site, nav);
        let mut seen = SeenKeys::new();
        let mut raw_units = Vec::new();
        for candidate in &candidates {
            raw_units.extend(extractor.extract(page, candidate, &mut seen).await);
        }

        let apartments = normalize::collate(&raw_units, Local::now().date_naive());
        info!(
            floorplans = candidates.len(),
            raw = raw_units.len(),
            distinct = seen.len(),
            units = apartments.len(),
            "scrape finished"
        );
        Ok(apartments)
    }

    /// Run, then reconcile the result with the store and notify.
    ///
    /// A failed run is logged to the store and the sink's error channel and
    /// returned. Collaborator failures after a successful scrape are recorded
    /// in the outcome and the run log instead.
    pub async fn execute(&self) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Utc::now();
        info!(%run_id, "run started");

        let (result, attempts) = self.run_counted().await;
        match result {
            Ok(apartments) => Ok(self.reconcile(run_id, started, attempts, apartments).await),
            Err(e) => {
                let message = format!("{e:#}");
                let log = RunLog {
                    run_id: run_id.clone(),
                    started,
                    completed: Utc::now(),
                    units_found: 0,
                    new_units: 0,
                    errors: vec![message.clone()],
                    status: RunStatus::Failed,
                };
                if let Err(log_err) = self.store.append_run_log(&log).await {
                    warn!(error = %format!("{log_err:#}"), "failed to record failed run");
                }
                let context = ErrorContext {
                    run_id,
                    attempts,
                    started,
                };
                self.sink.notify_error(&message, &context).await;
                Err(e)
            }
        }
    }

    async fn reconcile(
        &self,
        run_id: String,
        started: DateTime<Utc>,
        attempts: u32,
        apartments: Vec<Apartment>,
    ) -> RunOutcome {
        let mut errors = Vec::new();

        let new_units: Vec<Apartment> = match self.store.fetch_current().await {
            Ok(current) => {
                let known: HashSet<String> = current
                    .into_iter()
                    .map(|u| u.apartment.unit_number)
                    .collect();
                let mut announced = HashSet::new();
                apartments
                    .iter()
                    .filter(|a| !known.contains(&a.unit_number))
                    .filter(|a| announced.insert(a.unit_number.clone()))
                    .cloned()
                    .collect()
            }
            Err(e) => {
                record(&mut errors, "failed to load current units", e);
                Vec::new()
            }
        };

        if let Err(e) = self.store.upsert(&apartments).await {
            record(&mut errors, "failed to store units", e);
        }

        let found: Vec<String> = apartments.iter().map(|a| a.unit_number.clone()).collect();
        let removed = match self.store.delete_except(&found).await {
            Ok(removed) => removed,
            Err(e) => {
                record(&mut errors, "failed to retire old units", e);
                0
            }
        };

        if !new_units.is_empty() {
            if let Err(e) = self.sink.notify_new(&new_units).await {
                record(&mut errors, "failed to send new-unit notification", e);
            }
        }

        let completed = Utc::now();
        let log = RunLog {
            run_id: run_id.clone(),
            started,
            completed,
            units_found: apartments.len(),
            new_units: new_units.len(),
            errors: errors.clone(),
            status: RunStatus::Success,
        };
        if let Err(e) = self.store.append_run_log(&log).await {
            record(&mut errors, "failed to append run log", e);
        }

        info!(
            %run_id,
            units = apartments.len(),
            new = new_units.len(),
            removed,
            errors = errors.len(),
            "run reconciled"
        );

        RunOutcome {
            run_id,
            attempts,
            started,
            completed,
            apartments,
            new_units,
            removed,
            errors,
        }
    }
}

fn record(errors: &mut Vec<String>, what: &str, e: anyhow::Error) {
    let message = format!("{what}: {e:#}");
    warn!(error = %message, "reconciliation step failed");
    errors.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteProfile;
    use crate::renderer::static_page::{StaticLauncher, StaticSite};
    use crate::store::SqliteStore;
    use crate::types::PersistedUnit;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const BASE: &str = "https://apts.test";
    const INDEX: &str = "https://apts.test/floorplans";
    const DETAIL: &str = "https://apts.test/floorplans/the-dellwood";

    fn site(index_failures: usize) -> Arc<StaticSite> {
        Arc::new(
            StaticSite::new()
                .page(
                    INDEX,
                    r#"<div class="floorplan-card"><h3>The Dellwood</h3><p>Studio from $1,400</p></div>"#,
                )
                .page(
                    DETAIL,
                    r#"<div class="unit-details">#EAST-101 $1,400 Available Now</div>
                       <div class="unit-details">#WEST-641 $1,993 Available Sep 28</div>"#,
                )
                .flaky(INDEX, index_failures),
        )
    }

    fn config() -> Config {
        let mut config = Config::new(SiteProfile::new(BASE));
        config.retry.retry_delay = Duration::ZERO;
        config
    }

    #[derive(Default)]
    struct RecordingSink {
        new: Mutex<Vec<Vec<Apartment>>>,
        errors: Mutex<Vec<(String, ErrorContext)>>,
        fail_new: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify_new(&self, units: &[Apartment]) -> Result<()> {
            self.new.lock().unwrap().push(units.to_vec());
            if self.fail_new {
                bail!("webhook returned 502");
            }
            Ok(())
        }
        async fn notify_error(&self, message: &str, context: &ErrorContext) {
            self.errors
                .lock()
                .unwrap()
                .push((message.to_string(), context.clone()));
        }
    }

    fn orchestrator(
        launcher: Arc<StaticLauncher>,
        store: Arc<SqliteStore>,
        sink: Arc<RecordingSink>,
    ) -> Orchestrator {
        Orchestrator::new(config(), launcher, store, sink)
    }

    #[tokio::test]
    async fn test_retries_until_third_attempt() {
        // Each attempt walks all three load strategies on the index.
        let launcher = Arc::new(StaticLauncher::new(site(6)));
        let orch = orchestrator(
            Arc::clone(&launcher),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(RecordingSink::default()),
        );

        let apartments = orch.run().await.unwrap();

        let numbers: Vec<&str> = apartments.iter().map(|a| a.unit_number.as_str()).collect();
        assert_eq!(numbers, vec!["EAST-101", "WEST-641"]);
        assert_eq!(launcher.launches(), 3);
        // Closed after each of the two failures and once after success.
        assert_eq!(launcher.shutdowns(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let launcher = Arc::new(StaticLauncher::new(site(10)));
        let orch = orchestrator(
            Arc::clone(&launcher),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(RecordingSink::default()),
        );

        let err = orch.run().await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("after 3 attempts"));
        assert!(message.contains("connection reset"));
        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.shutdowns(), 3);
    }

    #[tokio::test]
    async fn test_execute_reconciles_with_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let known = |unit: &str| Apartment {
            unit_number: unit.into(),
            floorplan_name: "The Dellwood".into(),
            bedroom_count: 0,
            rent: 1400,
            availability_date: None,
        };
        store.upsert(&[known("EAST-101"), known("OLD-9")]).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            Arc::new(StaticLauncher::new(site(0))),
            Arc::clone(&store),
            Arc::clone(&sink),
        );

        let outcome = orch.execute().await.unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.apartments.len(), 2);
        assert_eq!(outcome.removed, 1);
        assert!(outcome.errors.is_empty());
        let new: Vec<&str> = outcome.new_units.iter().map(|a| a.unit_number.as_str()).collect();
        assert_eq!(new, vec!["WEST-641"]);

        let notified = sink.new.lock().unwrap().clone();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0][0].rent, 1993);

        let stored: Vec<PersistedUnit> = store.fetch_current().await.unwrap();
        let numbers: Vec<&str> = stored.iter().map(|u| u.apartment.unit_number.as_str()).collect();
        assert_eq!(numbers, vec!["EAST-101", "WEST-641"]);

        let runs = store.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].new_units, 1);
    }

    #[tokio::test]
    async fn test_execute_without_new_units_sends_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            Arc::new(StaticLauncher::new(site(0))),
            Arc::clone(&store),
            Arc::clone(&sink),
        );

        assert_eq!(orch.execute().await.unwrap().new_units.len(), 2);
        assert_eq!(orch.execute().await.unwrap().new_units.len(), 0);
        assert_eq!(sink.new.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_is_recorded_not_fatal() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink {
            fail_new: true,
            ..RecordingSink::default()
        });
        let orch = orchestrator(
            Arc::new(StaticLauncher::new(site(0))),
            Arc::clone(&store),
            sink,
        );

        let outcome = orch.execute().await.unwrap();
        assert_eq!(outcome.apartments.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("502"));

        let runs = store.recent_runs(1).unwrap();
        assert_eq!(runs[0].errors, outcome.errors);
        assert_eq!(store.fetch_current().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_failure_logs_and_notifies() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let orch = orchestrator(
            Arc::new(StaticLauncher::new(site(10))),
            Arc::clone(&store),
            Arc::clone(&sink),
        );

        assert!(orch.execute().await.is_err());

        let runs = store.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].errors[0].contains("connection reset"));

        let errors = sink.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1.attempts, 3);
        assert_eq!(errors[0].1.run_id, runs[0].run_id);
    }
}
