//! Audit sink
//!
//! Append-only event log with two outputs per event: a structured tracing
//! line for human follow-along and one row in a SQLite table for durable
//! history. Rows are keyed by run id with an autoincrement primary key, so
//! events from a single run are totally ordered. There is no update or
//! delete path.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;

/// Well-known event types. The store accepts unknown strings as well;
/// the payload column is schema-less JSON.
pub mod event_types {
    pub const AGENT_START: &str = "AGENT_START";
    pub const AGENT_COMPLETE: &str = "AGENT_COMPLETE";
    pub const AGENT_ERROR: &str = "AGENT_ERROR";
    pub const AI_REQUEST: &str = "AI_REQUEST";
    pub const AI_RESPONSE: &str = "AI_RESPONSE";
    pub const TOOL_EXEC_START: &str = "TOOL_EXEC_START";
    pub const TOOL_EXEC_END: &str = "TOOL_EXEC_END";
    pub const TOOL_EXEC_ERROR: &str = "TOOL_EXEC_ERROR";
    pub const STEP_START: &str = "STEP_START";
    pub const STEP_END: &str = "STEP_END";
    pub const STEP_FAIL: &str = "STEP_FAIL";
    pub const FALLBACK_APPLY: &str = "FALLBACK_APPLY";
    pub const RUN_REPORT: &str = "RUN_REPORT";
    pub const APPROVAL_REQUESTED: &str = "APPROVAL_REQUESTED";
    pub const NOTIFICATION_SENT: &str = "NOTIFICATION_SENT";
    pub const DOMAIN_SWITCH: &str = "DOMAIN_SWITCH";
}

/// Event severity for the stream output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

/// A stored audit row.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: i64,
    pub run_id: String,
    pub event_type: String,
    pub severity: String,
    pub message: String,
    pub data: Value,
    pub created_at: String,
}

/// Durable, append-only audit sink.
///
/// Opened once and shared; inserts are serialized by a writer lock so the
/// autoincrement key reflects insertion order.
pub struct AuditSink {
    conn: Mutex<Connection>,
}

impl AuditSink {
    /// Open (or create) the audit store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory sink for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_run ON audit_events(run_id)",
            [],
        )?;
        Ok(())
    }

    /// Record one event: stream line + durable row. Synchronous.
    pub fn record(
        &self,
        run_id: &str,
        event_type: &str,
        severity: Severity,
        message: &str,
        data: Value,
    ) {
        match severity {
            Severity::Info => {
                tracing::info!(run_id, event = event_type, data = %data, "{}", message)
            }
            Severity::Warn => {
                tracing::warn!(run_id, event = event_type, data = %data, "{}", message)
            }
            Severity::Error => {
                tracing::error!(run_id, event = event_type, data = %data, "{}", message)
            }
        }

        let conn = match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = conn.execute(
            "INSERT INTO audit_events (run_id, event_type, severity, message, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                event_type,
                severity.as_str(),
                message,
                data.to_string(),
                Utc::now().to_rfc3339(),
            ],
        ) {
            tracing::error!("Failed to persist audit event: {}", e);
        }
    }

    /// Shorthand for an informational event.
    pub fn info(&self, run_id: &str, event_type: &str, message: &str, data: Value) {
        self.record(run_id, event_type, Severity::Info, message, data);
    }

    /// All events for a run, in insertion order.
    pub fn events_for_run(&self, run_id: &str) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, run_id, event_type, severity, message, data, created_at
             FROM audit_events WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([run_id], |row| {
                let data: String = row.get(5)?;
                Ok(AuditEvent {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    event_type: row.get(2)?,
                    severity: row.get(3)?,
                    message: row.get(4)?,
                    data: serde_json::from_str(&data).unwrap_or(Value::Null),
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count events of one type within a run.
    pub fn count_for_run(&self, run_id: &str, event_type: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_events WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
