//! Per-user durable log collections.
//!
//! Each user owns one record whose value is the JSON array text of their
//! entries, in insertion order. The SQLite table is a plain key/value layout
//! so the on-disk shape matches the device-local storage the mobile client
//! uses (`screenLogs_<userId>` -> `[{screen, duration, timestamp}, ...]`).

use crate::error::StoreError;
use crate::model::{iso_timestamp, LogEntry};
use chrono::Utc;
use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::warn;

const KEY_PREFIX: &str = "screenLogs_";

pub trait LogStore {
    /// Read-modify-write append of one entry to the user's collection.
    fn append(&self, user_id: &str, entry: &LogEntry) -> Result<(), StoreError>;

    /// All entries for the user in insertion order. Missing or malformed
    /// records read as empty.
    fn read_all(&self, user_id: &str) -> Vec<LogEntry>;
}

impl<S: LogStore + ?Sized> LogStore for Arc<S> {
    fn append(&self, user_id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        (**self).append(user_id, entry)
    }

    fn read_all(&self, user_id: &str) -> Vec<LogEntry> {
        (**self).read_all(user_id)
    }
}

pub fn storage_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

pub struct SqliteLogStore {
    conn: Mutex<Connection>,
}

impl SqliteLogStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Drops the user's whole collection. Returns whether a record existed.
    pub fn clear(&self, user_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM kv_store WHERE key = ?1",
            [storage_key(user_id)],
        )?;
        Ok(n > 0)
    }

    /// User ids that currently have a record, sorted.
    pub fn users(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            if let Some(user) = r?.strip_prefix(KEY_PREFIX) {
                out.push(user.to_string());
            }
        }
        Ok(out)
    }

    /// Overwrites the raw stored text for a user. Only used to simulate
    /// records written by other clients.
    #[cfg(test)]
    fn put_raw(&self, user_id: &str, raw: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        write_value(&conn, &storage_key(user_id), raw)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LogStore for SqliteLogStore {
    fn append(&self, user_id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        let key = storage_key(user_id);
        // The guard spans read and write, so same-user appends from this
        // process cannot interleave.
        let conn = self.lock()?;
        let mut logs = decode_collection(&key, read_value(&conn, &key)?);
        logs.push(entry.clone());
        let value = serde_json::to_string(&logs)?;
        write_value(&conn, &key, &value)?;
        Ok(())
    }

    fn read_all(&self, user_id: &str) -> Vec<LogEntry> {
        let key = storage_key(user_id);
        let raw = match self.lock() {
            Ok(conn) => read_value(&conn, &key),
            Err(err) => {
                warn!("read {key} failed: {err}");
                return Vec::new();
            }
        };
        match raw {
            Ok(raw) => decode_collection(&key, raw),
            Err(err) => {
                warn!("read {key} failed: {err}");
                Vec::new()
            }
        }
    }
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS kv_store (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
    )
}

fn read_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;
    match stmt.query_row([key], |row| row.get::<_, String>(0)) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    let updated_at = iso_timestamp(Utc::now());
    conn.execute(
        r#"
INSERT INTO kv_store (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value=excluded.value,
  updated_at=excluded.updated_at
        "#,
        (key, value, updated_at),
    )?;
    Ok(())
}

fn decode_collection(key: &str, raw: Option<String>) -> Vec<LogEntry> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<LogEntry>>(&raw) {
        Ok(v) => v,
        Err(err) => {
            warn!("stored logs for {key} are malformed, treating as empty: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(screen: &str, duration: u64, secs: i64) -> LogEntry {
        LogEntry::new(screen, duration, Utc.timestamp_opt(1_771_113_600 + secs, 0).unwrap())
    }

    #[test]
    fn append_preserves_insertion_order() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.append("42", &entry("Login", 5, 5)).unwrap();
        store.append("42", &entry("Survey", 7, 12)).unwrap();
        store.append("42", &entry("Login", 1, 13)).unwrap();

        let screens: Vec<_> = store
            .read_all("42")
            .into_iter()
            .map(|e| e.screen)
            .collect();
        assert_eq!(screens, vec!["Login", "Survey", "Login"]);
    }

    #[test]
    fn users_are_partitioned() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.append("4", &entry("Login", 5, 5)).unwrap();
        store.append("42", &entry("Survey", 7, 12)).unwrap();

        assert_eq!(store.read_all("4").len(), 1);
        assert_eq!(store.read_all("42").len(), 1);
        assert_eq!(store.read_all("4")[0].screen, "Login");
        assert!(store.read_all("unknown").is_empty());
        assert_eq!(store.users().unwrap(), vec!["4", "42"]);
    }

    #[test]
    fn malformed_record_reads_as_empty_and_append_recovers() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.put_raw("42", "{not json").unwrap();
        assert!(store.read_all("42").is_empty());

        store.append("42", &entry("Survey", 2, 2)).unwrap();
        let logs = store.read_all("42");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].duration, 2);
    }

    #[test]
    fn stored_value_is_plain_json_array() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.append("7", &entry("Dashboard", 3, 0)).unwrap();
        let conn = store.lock().unwrap();
        let raw = read_value(&conn, "screenLogs_7").unwrap().unwrap();
        assert_eq!(
            raw,
            r#"[{"screen":"Dashboard","duration":3,"timestamp":"2026-02-15T00:00:00.000Z"}]"#
        );
    }

    #[test]
    fn clear_removes_only_that_user() {
        let store = SqliteLogStore::open_in_memory().unwrap();
        store.append("1", &entry("Login", 5, 5)).unwrap();
        store.append("2", &entry("Login", 5, 5)).unwrap();

        assert!(store.clear("1").unwrap());
        assert!(!store.clear("1").unwrap());
        assert!(store.read_all("1").is_empty());
        assert_eq!(store.read_all("2").len(), 1);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");
        {
            let store = SqliteLogStore::open(&path).unwrap();
            store.append("42", &entry("Login", 5, 5)).unwrap();
        }
        let store = SqliteLogStore::open(&path).unwrap();
        assert_eq!(store.read_all("42"), vec![entry("Login", 5, 5)]);
    }
}
