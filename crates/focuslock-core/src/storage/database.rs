//! SQLite-based engine storage.
//!
//! Provides persistent storage for:
//! - Recurring blocking schedules
//! - Emergency exit history
//! - Regret prevention windows
//! - Key-value store for engine state (commitment config, active session,
//!   regret protection state)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::migrations;
use crate::commitment::ExitRecord;
use crate::error::DatabaseError;
use crate::lock;
use crate::regret::RegretWindow;
use crate::schedule::Schedule;

/// SQLite database for engine state owned by the main process.
///
/// The monitor process never opens this file; it only sees the shared
/// state bridge.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    pub const FILE_NAME: &'static str = "focuslock.db";

    /// Open `focuslock.db` inside `dir`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_in_dir(dir: &Path) -> Result<Self, DatabaseError> {
        Self::open_at(&dir.join(Self::FILE_NAME))
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        tracing::debug!(path = ?path, "database opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ── Key-value ─────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = lock(&self.conn);
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn);
        conn.execute("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)", params![key, value])?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn);
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Read a JSON value from the kv store.
    pub fn kv_get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DatabaseError> {
        match self.kv_get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DatabaseError::CorruptRow(format!("kv '{key}': {e}"))),
            None => Ok(None),
        }
    }

    pub fn kv_set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DatabaseError> {
        let raw = to_json(value)?;
        self.kv_set(key, &raw)
    }

    // ── Schedules ─────────────────────────────────────────────────────

    pub fn list_schedules(&self) -> Result<Vec<Schedule>, DatabaseError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, name, recurrence, restrictions, is_enabled, is_strict_mode, created_at, updated_at
             FROM schedules
             ORDER BY created_at, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScheduleRow {
                id: row.get(0)?,
                name: row.get(1)?,
                recurrence: row.get(2)?,
                restrictions: row.get(3)?,
                is_enabled: row.get(4)?,
                is_strict_mode: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;

        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(row?.into_schedule()?);
        }
        Ok(schedules)
    }

    /// Insert a schedule, or update it in place when the id exists.
    pub fn upsert_schedule(&self, schedule: &Schedule) -> Result<(), DatabaseError> {
        let recurrence = to_json(&schedule.recurrence)?;
        let restrictions = to_json(&schedule.restrictions)?;
        let conn = lock(&self.conn);
        conn.execute(
            "INSERT INTO schedules (id, name, recurrence, restrictions, is_enabled, is_strict_mode, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                recurrence = excluded.recurrence,
                restrictions = excluded.restrictions,
                is_enabled = excluded.is_enabled,
                is_strict_mode = excluded.is_strict_mode,
                updated_at = excluded.updated_at",
            params![
                schedule.id,
                schedule.name,
                recurrence,
                restrictions,
                schedule.is_enabled,
                schedule.is_strict_mode,
                schedule.created_at.to_rfc3339(),
                schedule.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Returns whether a row was deleted.
    pub fn delete_schedule(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = lock(&self.conn);
        let deleted = conn.execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ── Exit history ──────────────────────────────────────────────────

    /// Exit records, oldest first.
    pub fn list_exits(&self) -> Result<Vec<ExitRecord>, DatabaseError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, focused_secs, remaining_secs, timestamp, price_paid_cents, rating
             FROM exit_records
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<u8>>(6)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, session_id, focused_secs, remaining_secs, timestamp, price, rating) = row?;
            records.push(ExitRecord {
                id,
                session_id,
                focused_secs,
                remaining_secs,
                timestamp: parse_timestamp(&timestamp)?,
                price_paid_cents: u64::try_from(price)
                    .map_err(|_| DatabaseError::CorruptRow(format!("negative exit price {price}")))?,
                rating,
            });
        }
        Ok(records)
    }

    /// Store the user's rating on exit record `id`.
    ///
    /// Returns whether the record exists.
    pub fn rate_exit(&self, id: i64, rating: u8) -> Result<bool, DatabaseError> {
        let conn = lock(&self.conn);
        let updated = conn.execute(
            "UPDATE exit_records SET rating = ?2 WHERE id = ?1",
            params![id, rating],
        )?;
        Ok(updated > 0)
    }

    /// Persist a paid exit in one transaction: the kv entries describing the
    /// new commitment state, the exit record, and history trimming to `cap`.
    ///
    /// Returns the new record's id.
    pub fn commit_exit(
        &self,
        record: &ExitRecord,
        cap: usize,
        kv: &[(&str, String)],
    ) -> Result<i64, DatabaseError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        for (key, value) in kv {
            tx.execute("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)", params![key, value])?;
        }
        tx.execute(
            "INSERT INTO exit_records (session_id, focused_secs, remaining_secs, timestamp, price_paid_cents, rating)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.session_id,
                record.focused_secs,
                record.remaining_secs,
                record.timestamp.to_rfc3339(),
                i64::try_from(record.price_paid_cents).unwrap_or(i64::MAX),
                record.rating,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let cap = i64::try_from(cap).unwrap_or(i64::MAX);
        tx.execute(
            "DELETE FROM exit_records
             WHERE id NOT IN (SELECT id FROM exit_records ORDER BY id DESC LIMIT ?1)",
            params![cap],
        )?;
        tx.commit()?;
        Ok(id)
    }

    // ── Regret windows ────────────────────────────────────────────────

    /// Regret windows in list order.
    pub fn list_regret_windows(&self) -> Result<Vec<RegretWindow>, DatabaseError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, kind, is_enabled, message FROM regret_windows ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut windows = Vec::new();
        for row in rows {
            let (id, kind, is_enabled, message) = row?;
            let kind = serde_json::from_str(&kind)
                .map_err(|e| DatabaseError::CorruptRow(format!("regret window {id}: {e}")))?;
            windows.push(RegretWindow {
                id,
                kind,
                is_enabled,
                message,
            });
        }
        Ok(windows)
    }

    /// Replace the stored window list, keeping the given order.
    pub fn save_regret_windows(&self, windows: &[RegretWindow]) -> Result<(), DatabaseError> {
        let encoded = windows
            .iter()
            .map(|w| to_json(&w.kind))
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM regret_windows", [])?;
        for (position, (window, kind)) in windows.iter().zip(encoded).enumerate() {
            tx.execute(
                "INSERT INTO regret_windows (id, position, kind, is_enabled, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    window.id,
                    i64::try_from(position).unwrap_or(i64::MAX),
                    kind,
                    window.is_enabled,
                    window.message,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

struct ScheduleRow {
    id: String,
    name: String,
    recurrence: String,
    restrictions: String,
    is_enabled: bool,
    is_strict_mode: bool,
    created_at: String,
    updated_at: String,
}

impl ScheduleRow {
    fn into_schedule(self) -> Result<Schedule, DatabaseError> {
        let corrupt = |field: &str, e: serde_json::Error| {
            DatabaseError::CorruptRow(format!("schedule {} {field}: {e}", self.id))
        };
        let recurrence = serde_json::from_str(&self.recurrence).map_err(|e| corrupt("recurrence", e))?;
        let restrictions =
            serde_json::from_str(&self.restrictions).map_err(|e| corrupt("restrictions", e))?;
        Ok(Schedule {
            recurrence,
            restrictions,
            is_enabled: self.is_enabled,
            is_strict_mode: self.is_strict_mode,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            name: self.name,
        })
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::QueryFailed(format!("encode failed: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow(format!("timestamp '{raw}': {e}")))
}
