//! SQLite-backed append-only event log and state snapshots.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::events::EngineEvent;

pub struct EventLog {
    conn: Connection,
}

impl EventLog {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                trigger_source TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS snapshots (
                bot_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bot_id, key)
            );
            CREATE TABLE IF NOT EXISTS applied_fills (
                idempotency_key TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                end_reason TEXT,
                orders_cancelled INTEGER DEFAULT 0,
                orders_placed INTEGER DEFAULT 0,
                config_snapshot TEXT
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let log = Self { conn };
        log.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                trigger_source TEXT NOT NULL,
                details TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS snapshots (
                bot_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bot_id, key)
            );
            CREATE TABLE IF NOT EXISTS applied_fills (
                idempotency_key TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                end_reason TEXT,
                orders_cancelled INTEGER DEFAULT 0,
                orders_placed INTEGER DEFAULT 0,
                config_snapshot TEXT
            );",
        )?;
        Ok(log)
    }

    pub fn append_event(&self, event: &EngineEvent) -> rusqlite::Result<()> {
        let event_type = serde_json::to_value(event.event_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let trigger = serde_json::to_value(event.trigger)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.conn.execute(
            "INSERT INTO events (session_id, timestamp, event_type, trigger_source, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                event_type,
                trigger,
                event.details,
            ],
        )?;
        Ok(())
    }

    pub fn write_snapshot(&self, bot_id: &str, key: &str, value: &str, now: DateTime<Utc>) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO snapshots (bot_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bot_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![bot_id, key, value, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record a session start, returning once the row exists.
    pub fn open_session(&self, session_id: Uuid, started_at: DateTime<Utc>, config_snapshot: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (session_id, started_at, config_snapshot) VALUES (?1, ?2, ?3)",
            params![session_id.to_string(), started_at.to_rfc3339(), config_snapshot],
        )?;
        Ok(())
    }

    pub fn close_session(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        end_reason: &str,
        orders_cancelled: u64,
        orders_placed: u64,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE sessions SET ended_at = ?1, end_reason = ?2, orders_cancelled = ?3, orders_placed = ?4
             WHERE session_id = ?5",
            params![
                ended_at.to_rfc3339(),
                end_reason,
                orders_cancelled as i64,
                orders_placed as i64,
                session_id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Startup counts recorded by the previous session, used to populate
    /// `startup_orders_cancelled` on the next session per the shutdown
    /// scenario's expectations.
    pub fn last_session_orders_cancelled(&self) -> rusqlite::Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT orders_cancelled FROM sessions ORDER BY started_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })
    }

    /// Idempotency check for fills: `trade_id` when available, else
    /// `(client_order_id, timestamp, price, qty)`.
    pub fn fill_already_applied(&self, idempotency_key: &str) -> rusqlite::Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM applied_fills WHERE idempotency_key = ?1",
            params![idempotency_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn mark_fill_applied(&self, idempotency_key: &str, now: DateTime<Utc>) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO applied_fills (idempotency_key, applied_at) VALUES (?1, ?2)",
            params![idempotency_key, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Export the full event log and latest snapshots to a JSON file for
    /// operator inspection, mirroring the existing state-export convention.
    pub fn export_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT session_id, timestamp, event_type, trigger_source, details FROM events ORDER BY id")?;
        let events: Vec<ExportedEvent> = stmt
            .query_map([], |row| {
                Ok(ExportedEvent {
                    session_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    event_type: row.get(2)?,
                    trigger: row.get(3)?,
                    details: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare("SELECT bot_id, key, value, updated_at FROM snapshots")?;
        let snapshots: Vec<ExportedSnapshot> = stmt
            .query_map([], |row| {
                Ok(ExportedSnapshot {
                    bot_id: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let export = Value::from(serde_json::json!({
            "events": events,
            "snapshots": snapshots,
        }));
        std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedEvent {
    session_id: String,
    timestamp: String,
    event_type: String,
    trigger: String,
    details: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedSnapshot {
    bot_id: String,
    key: String,
    value: String,
    updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventTrigger};

    #[test]
    fn append_and_export_round_trip() {
        let log = EventLog::open_in_memory().unwrap();
        let event = EngineEvent::new(
            Uuid::nil(),
            DateTime::from_timestamp(0, 0).unwrap(),
            EventKind::Filled,
            EventTrigger::Strategy,
            "buy fill at level 0",
        );
        log.append_event(&event).unwrap();
        let tmp = std::env::temp_dir().join(format!("grid-engine-export-test-{}.json", Uuid::new_v4()));
        log.export_json(&tmp).unwrap();
        let contents = std::fs::read_to_string(&tmp).unwrap();
        assert!(contents.contains("buy fill at level 0"));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn fill_idempotency_check() {
        let log = EventLog::open_in_memory().unwrap();
        let key = "coid-1|2026-01-01T00:00:00Z|50000|0.001";
        assert!(!log.fill_already_applied(key).unwrap());
        log.mark_fill_applied(key, DateTime::from_timestamp(0, 0).unwrap()).unwrap();
        assert!(log.fill_already_applied(key).unwrap());
    }

    #[test]
    fn session_lifecycle_records_counts() {
        let log = EventLog::open_in_memory().unwrap();
        let session_id = Uuid::new_v4();
        let now = DateTime::from_timestamp(0, 0).unwrap();
        log.open_session(session_id, now, "{}").unwrap();
        log.close_session(session_id, now, "normal", 0, 8).unwrap();
        assert_eq!(log.last_session_orders_cancelled().unwrap(), Some(0));
    }
}
