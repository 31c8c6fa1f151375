//! SQLite-backed shared state.
//!
//! Both processes open the same database file. WAL mode lets the monitor
//! read while the main process writes, and `INSERT OR REPLACE` on a single
//! row gives atomic replace-on-write per key.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::SharedStateBridge;
use crate::error::BridgeError;
use crate::lock;

pub struct SqliteBridge {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteBridge {
    pub const FILE_NAME: &'static str = "shared_state.db";

    /// Open (or create) the shared state database at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the table created.
    pub fn open(path: &Path) -> Result<Self, BridgeError> {
        let conn = Connection::open(path).map_err(|e| BridgeError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let bridge = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        bridge.migrate()?;
        Ok(bridge)
    }

    /// Shared state database inside a data directory.
    pub fn open_in_dir(dir: &Path) -> Result<Self, BridgeError> {
        Self::open(&dir.join(Self::FILE_NAME))
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, BridgeError> {
        let conn = Connection::open_in_memory()?;
        let bridge = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        bridge.migrate()?;
        Ok(bridge)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<(), BridgeError> {
        lock(&self.conn).execute_batch(
            "CREATE TABLE IF NOT EXISTS shared_state (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl SharedStateBridge for SqliteBridge {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BridgeError> {
        let conn = lock(&self.conn);
        let value = conn
            .query_row(
                "SELECT value FROM shared_state WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), BridgeError> {
        lock(&self.conn).execute(
            "INSERT OR REPLACE INTO shared_state (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BridgeError> {
        lock(&self.conn).execute("DELETE FROM shared_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_previous_value() {
        let bridge = SqliteBridge::open_memory().unwrap();
        bridge.write("k", b"one").unwrap();
        bridge.write("k", b"two").unwrap();
        assert_eq!(bridge.read("k").unwrap(), Some(b"two".to_vec()));

        bridge.remove("k").unwrap();
        assert_eq!(bridge.read("k").unwrap(), None);
    }

    #[test]
    fn second_handle_sees_writes_from_first() {
        let dir = tempfile::tempdir().unwrap();
        let main_process = SqliteBridge::open_in_dir(dir.path()).unwrap();
        let monitor_process = SqliteBridge::open_in_dir(dir.path()).unwrap();

        main_process.write("schedule.snapshots", b"{}").unwrap();
        assert_eq!(
            monitor_process.read("schedule.snapshots").unwrap(),
            Some(b"{}".to_vec())
        );
    }
}
