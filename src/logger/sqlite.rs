//! SQLite activity store: harness events and scenario verdict history.
//!
//! WAL mode so `ish history` can read while a run is writing; inserts go
//! through cached prepared statements.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{IshError, Result};

/// SQLite activity logger.
pub struct SqliteLogger {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLogger {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IshError::io(parent, source))?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing database without creating it.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IshError::Sql {
                context: "open",
                details: format!("no activity database at {}", path.display()),
            });
        }
        Self::open(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ──────────────────── harness_events ────────────────────

    pub fn log_event(&self, row: &EventRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO harness_events (
                timestamp, event_type, severity, suite, scenario, record, status,
                customer_id, operation, count, passed, duration_ms, error_code,
                error_message, details
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            )?
            .execute(params![
                row.timestamp,
                row.event_type,
                row.severity,
                row.suite,
                row.scenario,
                row.record,
                row.status,
                row.customer_id,
                row.operation,
                row.count,
                row.passed,
                row.duration_ms,
                row.error_code,
                row.error_message,
                row.details,
            ])?;
        Ok(())
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: u32) -> Result<Vec<EventRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, event_type, severity, suite, scenario, record, status,
                    customer_id, operation, count, passed, duration_ms, error_code,
                    error_message, details
             FROM harness_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(EventRow {
                    timestamp: row.get(0)?,
                    event_type: row.get(1)?,
                    severity: row.get(2)?,
                    suite: row.get(3)?,
                    scenario: row.get(4)?,
                    record: row.get(5)?,
                    status: row.get(6)?,
                    customer_id: row.get(7)?,
                    operation: row.get(8)?,
                    count: row.get(9)?,
                    passed: row.get(10)?,
                    duration_ms: row.get(11)?,
                    error_code: row.get(12)?,
                    error_message: row.get(13)?,
                    details: row.get(14)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete events and verdicts older than `retention_days`; returns rows
    /// deleted across both tables.
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let events = self.conn.execute(
            "DELETE FROM harness_events WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let verdicts = self.conn.execute(
            "DELETE FROM scenario_verdicts WHERE recorded_at < ?1",
            params![cutoff],
        )?;
        Ok(events + verdicts)
    }

    // ──────────────────── scenario_verdicts ────────────────────

    pub fn record_verdict(&self, row: &VerdictRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO scenario_verdicts (
                recorded_at, suite, scenario, passed, message, source, digest, duration_ms
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            )?
            .execute(params![
                row.recorded_at,
                row.suite,
                row.scenario,
                row.passed,
                row.message,
                row.source,
                row.digest,
                row.duration_ms,
            ])?;
        Ok(())
    }

    /// Most recent verdicts, newest first.
    pub fn recent_verdicts(&self, limit: u32) -> Result<Vec<VerdictRow>> {
        self.query_verdicts(
            "SELECT recorded_at, suite, scenario, passed, message, source, digest, duration_ms
             FROM scenario_verdicts ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Verdict history of one scenario, newest first.
    pub fn verdicts_for(&self, scenario: &str, limit: u32) -> Result<Vec<VerdictRow>> {
        self.query_verdicts(
            "SELECT recorded_at, suite, scenario, passed, message, source, digest, duration_ms
             FROM scenario_verdicts WHERE scenario = ?1 ORDER BY id DESC LIMIT ?2",
            params![scenario, limit],
        )
    }

    fn query_verdicts(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<VerdictRow>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(VerdictRow {
                    recorded_at: row.get(0)?,
                    suite: row.get(1)?,
                    scenario: row.get(2)?,
                    passed: row.get(3)?,
                    message: row.get(4)?,
                    source: row.get(5)?,
                    digest: row.get(6)?,
                    duration_ms: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ──────────────────── row types ────────────────────

/// Row of `harness_events`.
#[derive(Debug, Clone, Default)]
pub struct EventRow {
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub suite: Option<String>,
    pub scenario: Option<String>,
    pub record: Option<String>,
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub operation: Option<String>,
    pub count: Option<i64>,
    pub passed: Option<bool>,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

/// Row of `scenario_verdicts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictRow {
    pub recorded_at: String,
    pub suite: Option<String>,
    pub scenario: String,
    pub passed: bool,
    pub message: String,
    pub source: Option<String>,
    pub digest: Option<String>,
    pub duration_ms: i64,
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[ISH-SQLITE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS harness_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            suite TEXT,
            scenario TEXT,
            record TEXT,
            status TEXT,
            customer_id TEXT,
            operation TEXT,
            count INTEGER,
            passed INTEGER,
            duration_ms INTEGER,
            error_code TEXT,
            error_message TEXT,
            details TEXT
        );

        CREATE TABLE IF NOT EXISTS scenario_verdicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            suite TEXT,
            scenario TEXT NOT NULL,
            passed INTEGER NOT NULL,
            message TEXT NOT NULL,
            source TEXT,
            digest TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON harness_events(timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_type_time ON harness_events(event_type, timestamp);
        CREATE INDEX IF NOT EXISTS idx_verdicts_scenario ON scenario_verdicts(scenario);",
    )?;
    Ok(())
}
