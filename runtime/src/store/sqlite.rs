//! SQLite-backed record store.

use super::RecordStore;
use crate::types::{Apartment, PersistedUnit, RunLog, RunStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS units (
    unit_number TEXT PRIMARY KEY,
    floorplan_name TEXT NOT NULL,
    bedroom_count INTEGER NOT NULL,
    rent INTEGER NOT NULL,
    availability_date TEXT,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_logs (
    run_id TEXT PRIMARY KEY,
    started TEXT NOT NULL,
    completed TEXT NOT NULL,
    units_found INTEGER NOT NULL,
    new_units INTEGER NOT NULL,
    errors TEXT NOT NULL,
    status TEXT NOT NULL
);";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Units and run logs in one SQLite file.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open unit store: {}", path.display()))?;
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("failed to open in-memory store")?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)
            .context("failed to create unit store tables")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| anyhow!("unit store lock poisoned"))
    }

    /// Most recent run logs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunLog>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT run_id, started, completed, units_found, new_units, errors, status
             FROM run_logs ORDER BY started DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let errors: String = row.get(5)?;
            let status: String = row.get(6)?;
            Ok(RunLog {
                run_id: row.get(0)?,
                started: parse_timestamp(row.get(1)?, 1)?,
                completed: parse_timestamp(row.get(2)?, 2)?,
                units_found: row.get::<_, i64>(3)? as usize,
                new_units: row.get::<_, i64>(4)? as usize,
                errors: serde_json::from_str(&errors)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                status: if status == RunStatus::Success.as_str() {
                    RunStatus::Success
                } else {
                    RunStatus::Failed
                },
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read run logs")
    }
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_date(raw: Option<String>, column: usize) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn fetch_current(&self) -> Result<Vec<PersistedUnit>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT unit_number, floorplan_name, bedroom_count, rent, availability_date,
                    first_seen, last_seen
             FROM units ORDER BY unit_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PersistedUnit {
                apartment: Apartment {
                    unit_number: row.get(0)?,
                    floorplan_name: row.get(1)?,
                    bedroom_count: row.get(2)?,
                    rent: row.get(3)?,
                    availability_date: parse_date(row.get(4)?, 4)?,
                },
                first_seen: parse_timestamp(row.get(5)?, 5)?,
                last_seen: parse_timestamp(row.get(6)?, 6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read units")
    }

    async fn upsert(&self, units: &[Apartment]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO units (unit_number, floorplan_name, bedroom_count, rent,
                                    availability_date, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(unit_number) DO UPDATE SET
                    floorplan_name = excluded.floorplan_name,
                    bedroom_count = excluded.bedroom_count,
                    rent = excluded.rent,
                    availability_date = excluded.availability_date,
                    last_seen = excluded.last_seen",
            )?;
            for unit in units {
                stmt.execute(params![
                    unit.unit_number,
                    unit.floorplan_name,
                    unit.bedroom_count,
                    unit.rent,
                    unit.availability_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    now,
                ])?;
            }
        }
        tx.commit().context("failed to commit unit upsert")
    }

    async fn delete_except(&self, keep: &[String]) -> Result<usize> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT unit_number FROM units")?;
            let numbers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            numbers
                .into_iter()
                .filter(|n| !keep.contains(n.as_str()))
                .collect()
        };
        for number in &stale {
            tx.execute("DELETE FROM units WHERE unit_number = ?1", params![number])?;
        }
        tx.commit().context("failed to commit unit removal")?;
        Ok(stale.len())
    }

    async fn append_run_log(&self, log: &RunLog) -> Result<()> {
        let errors = serde_json::to_string(&log.errors)?;
        let db = self.conn()?;
        db.execute(
            "INSERT INTO run_logs (run_id, started, completed, units_found, new_units, errors, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.run_id,
                log.started.to_rfc3339(),
                log.completed.to_rfc3339(),
                log.units_found as i64,
                log.new_units as i64,
                errors,
                log.status.as_str(),
            ],
        )
        .context("failed to append run log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apartment(unit: &str, rent: u32) -> Apartment {
        Apartment {
            unit_number: unit.into(),
            floorplan_name: "The Dellwood".into(),
            bedroom_count: 1,
            rent,
            availability_date: NaiveDate::from_ymd_opt(2026, 9, 28),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_first_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("nested").join("units.db")).unwrap();

        store.upsert(&[apartment("WEST-641", 1993)]).await.unwrap();
        let first = store.fetch_current().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].apartment, apartment("WEST-641", 1993));

        store.upsert(&[apartment("WEST-641", 1950)]).await.unwrap();
        let second = store.fetch_current().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].apartment.rent, 1950);
        assert_eq!(second[0].first_seen, first[0].first_seen);
        assert!(second[0].last_seen >= first[0].last_seen);
    }

    #[tokio::test]
    async fn test_delete_except() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(&[apartment("A-1", 1), apartment("B-2", 2), apartment("C-3", 3)])
            .await
            .unwrap();

        let removed = store.delete_except(&["B-2".to_string()]).await.unwrap();
        assert_eq!(removed, 2);
        let left: Vec<String> = store
            .fetch_current()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.apartment.unit_number)
            .collect();
        assert_eq!(left, vec!["B-2"]);
    }

    #[tokio::test]
    async fn test_run_logs_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.db");
        let started = Utc::now();
        let log = RunLog {
            run_id: "run-1".into(),
            started,
            completed: started,
            units_found: 3,
            new_units: 1,
            errors: vec!["webhook returned 500".into()],
            status: RunStatus::Success,
        };
        SqliteStore::open(&path).unwrap().append_run_log(&log).await.unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        let runs = reopened.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].errors, log.errors);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].new_units, 1);
    }
}
