//! Dual-write coordinator: one logger thread owns the JSONL writer and the
//! SQLite store; the harness sends [`ActivityEvent`]s through a bounded
//! crossbeam channel.
//!
//! `send()` uses `try_send()`, so a slow disk never stalls a scenario. Events
//! that do not fit are counted and reported on the next write.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::Config;
use crate::core::errors::{IshError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
#[cfg(feature = "sqlite")]
use crate::logger::sqlite::{EventRow, SqliteLogger, VerdictRow};

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── events ────────────────────

/// Everything the harness reports while running suites.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    SuiteStarted {
        suite: String,
        scenarios: usize,
        backend: String,
        config_hash: String,
    },
    SuiteFinished {
        suite: String,
        total: usize,
        failed: usize,
        duration_ms: u64,
    },
    ScenarioStarted {
        suite: String,
        scenario: String,
        source: Option<String>,
    },
    RecordCreated {
        scenario: String,
        record: String,
        customer_id: Option<String>,
    },
    RecordRejected {
        scenario: String,
        record: String,
        status: String,
        message: Option<String>,
    },
    OperationExecuted {
        scenario: String,
        operation: String,
        status: String,
        returned: usize,
        duration_ms: u64,
    },
    VerdictRecorded {
        suite: Option<String>,
        scenario: String,
        passed: bool,
        message: String,
        source: Option<String>,
        digest: Option<String>,
        duration_ms: u64,
    },
    VerdictReplaced {
        scenario: String,
    },
    CleanupDone {
        scenario: String,
    },
    CleanupFailed {
        scenario: String,
        code: String,
        message: String,
    },
    Error {
        scenario: Option<String>,
        code: String,
        message: String,
    },
    /// Stops the logger thread.
    Shutdown,
}

impl ActivityEvent {
    #[must_use]
    pub fn error(scenario: Option<&str>, err: &IshError) -> Self {
        Self::Error {
            scenario: scenario.map(str::to_string),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ──────────────────── handle ────────────────────

/// Cloneable sender side of the logger.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event without blocking; drops it when the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

pub struct DualLoggerConfig {
    /// `None` disables SQLite.
    pub sqlite_path: Option<PathBuf>,
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl DualLoggerConfig {
    /// Logger settings derived from the `[paths]` section.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            sqlite_path: Some(config.paths.sqlite_db.clone()),
            jsonl_config: JsonlConfig {
                path: config.paths.jsonl_log.clone(),
                ..JsonlConfig::default()
            },
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread; it runs until `shutdown()` or until every
/// handle is dropped.
pub fn spawn_logger(
    config: DualLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("ish-logger".to_string())
        .spawn(move || {
            logger_thread_main(&rx, config.sqlite_path, config.jsonl_config, &dropped);
        })
        .map_err(|e| IshError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(
    rx: &Receiver<ActivityEvent>,
    sqlite_path: Option<PathBuf>,
    jsonl_config: JsonlConfig,
    dropped: &AtomicU64,
) {
    #[cfg(feature = "sqlite")]
    let mut sqlite = sqlite_path.and_then(|p| match SqliteLogger::open(&p) {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("[ISH-DUAL] failed to open SQLite at {}: {e}", p.display());
            None
        }
    });
    #[cfg(not(feature = "sqlite"))]
    let _ = sqlite_path;

    let mut jsonl = JsonlWriter::open(jsonl_config);
    #[cfg(feature = "sqlite")]
    let mut sqlite_failures: u32 = 0;

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            jsonl.write_entry(
                &LogEntry::new(EventType::Error, Severity::Warning)
                    .details(format!("{lost} log events dropped due to back-pressure")),
            );
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));

        #[cfg(feature = "sqlite")]
        if let Some(db) = &sqlite {
            let event_ok = db.log_event(&event_to_row(&event)).is_ok();
            let verdict_ok = event_to_verdict_row(&event)
                .as_ref()
                .is_none_or(|row| db.record_verdict(row).is_ok());
            if event_ok && verdict_ok {
                sqlite_failures = 0;
            } else {
                sqlite_failures += 1;
                if sqlite_failures >= 3 {
                    eprintln!("[ISH-DUAL] SQLite write failed {sqlite_failures} times, disabling");
                    sqlite = None;
                }
            }
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SuiteStarted {
            suite,
            scenarios,
            backend,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::SuiteStarted, Severity::Info).suite(suite);
            e.count = Some(*scenarios as u64);
            e.details = Some(format!("backend={backend} config_hash={config_hash}"));
            e
        }
        ActivityEvent::SuiteFinished {
            suite,
            total,
            failed,
            duration_ms,
        } => {
            let severity = if *failed == 0 {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::SuiteFinished, severity).suite(suite);
            e.count = Some(*total as u64);
            e.passed = Some(*failed == 0);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("failed={failed}"));
            e
        }
        ActivityEvent::ScenarioStarted {
            suite,
            scenario,
            source,
        } => {
            let mut e = LogEntry::new(EventType::ScenarioStarted, Severity::Info)
                .suite(suite)
                .scenario(scenario);
            e.details.clone_from(source);
            e
        }
        ActivityEvent::RecordCreated {
            scenario,
            record,
            customer_id,
        } => {
            let mut e = LogEntry::new(EventType::RecordCreated, Severity::Info).scenario(scenario);
            e.record = Some(record.clone());
            e.customer_id.clone_from(customer_id);
            e
        }
        ActivityEvent::RecordRejected {
            scenario,
            record,
            status,
            message,
        } => {
            let mut e =
                LogEntry::new(EventType::RecordRejected, Severity::Warning).scenario(scenario);
            e.record = Some(record.clone());
            e.status = Some(status.clone());
            e.details.clone_from(message);
            e
        }
        ActivityEvent::OperationExecuted {
            scenario,
            operation,
            status,
            returned,
            duration_ms,
        } => {
            let mut e =
                LogEntry::new(EventType::OperationExecuted, Severity::Info).scenario(scenario);
            e.operation = Some(operation.clone());
            e.status = Some(status.clone());
            e.count = Some(*returned as u64);
            e.duration_ms = Some(*duration_ms);
            e
        }
        ActivityEvent::VerdictRecorded {
            suite,
            scenario,
            passed,
            duration_ms,
            ..
        } => {
            let severity = if *passed {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::VerdictRecorded, severity).scenario(scenario);
            e.suite.clone_from(suite);
            e.passed = Some(*passed);
            e.duration_ms = Some(*duration_ms);
            e
        }
        ActivityEvent::VerdictReplaced { scenario } => {
            LogEntry::new(EventType::VerdictReplaced, Severity::Warning)
                .scenario(scenario)
                .details("an earlier verdict with the same name was replaced")
        }
        ActivityEvent::CleanupDone { scenario } => {
            LogEntry::new(EventType::CleanupDone, Severity::Info).scenario(scenario)
        }
        ActivityEvent::CleanupFailed {
            scenario,
            code,
            message,
        } => {
            let mut e =
                LogEntry::new(EventType::CleanupFailed, Severity::Warning).scenario(scenario);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Error {
            scenario,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.scenario.clone_from(scenario);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SuiteFinished, Severity::Info),
    }
}

#[cfg(feature = "sqlite")]
#[allow(clippy::cast_possible_wrap)]
fn event_to_row(event: &ActivityEvent) -> EventRow {
    let entry = event_to_log_entry(event);
    EventRow {
        timestamp: entry.ts,
        event_type: entry.event.as_str().to_string(),
        severity: entry.severity.as_str().to_string(),
        suite: entry.suite,
        scenario: entry.scenario,
        record: entry.record,
        status: entry.status,
        customer_id: entry.customer_id,
        operation: entry.operation,
        count: entry.count.map(|c| c as i64),
        passed: entry.passed,
        duration_ms: entry.duration_ms.map(|d| d as i64),
        error_code: entry.error_code,
        error_message: entry.error_message,
        details: entry.details,
    }
}

#[cfg(feature = "sqlite")]
#[allow(clippy::cast_possible_wrap)]
fn event_to_verdict_row(event: &ActivityEvent) -> Option<VerdictRow> {
    match event {
        ActivityEvent::VerdictRecorded {
            suite,
            scenario,
            passed,
            message,
            source,
            digest,
            duration_ms,
        } => Some(VerdictRow {
            recorded_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            suite: suite.clone(),
            scenario: scenario.clone(),
            passed: *passed,
            message: message.clone(),
            source: source.clone(),
            digest: digest.clone(),
            duration_ms: *duration_ms as i64,
        }),
        _ => None,
    }
}
