//! SQLite-backed alert storage.
//!
//! One table, one row per alert, keyed by token. Thread-safe via an
//! internal `Mutex<Connection>`; every operation is a single statement,
//! which keeps row-level atomicity on the SQLite side.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use tracing::{debug, warn};

use super::{AlertRecord, AlertStorage};
use crate::error::{AlertError, Result};
use crate::types::AlertState;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS alerts (\
     token TEXT PRIMARY KEY NOT NULL,\
     type_name TEXT NOT NULL,\
     scheduled_iso TEXT NOT NULL,\
     state TEXT NOT NULL,\
     assets TEXT NOT NULL DEFAULT '{}')";

/// SQLite-backed alert storage at a caller-supplied path.
pub struct SqliteAlertStorage {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteAlertStorage {
    /// Create a handle for the database at `path`. No I/O happens until
    /// [`open`](AlertStorage::open) or
    /// [`create_database`](AlertStorage::create_database).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().expect("storage mutex poisoned")
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| AlertError::Storage("database not open".to_owned()))?;
        f(conn)
    }
}

impl AlertStorage for SqliteAlertStorage {
    fn open(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(AlertError::Storage(format!(
                "no database at {}",
                self.path.display()
            )));
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| AlertError::Storage(format!("cannot open database: {e}")))?;

        let has_table: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'alerts'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| AlertError::Storage(format!("cannot inspect schema: {e}")))?;
        if !has_table {
            return Err(AlertError::Storage("alerts table missing".to_owned()));
        }

        *self.lock() = Some(conn);
        Ok(())
    }

    fn create_database(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AlertError::Storage(format!("cannot create database dir: {e}")))?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| AlertError::Storage(format!("cannot create database: {e}")))?;
        conn.execute(SCHEMA, [])
            .map_err(|e| AlertError::Storage(format!("cannot apply schema: {e}")))?;

        *self.lock() = Some(conn);
        Ok(())
    }

    fn clear_database(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM alerts", [])
                .map_err(|e| AlertError::Storage(format!("cannot clear database: {e}")))?;
            Ok(())
        })
    }

    fn load(&self) -> Result<Vec<AlertRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT token, type_name, scheduled_iso, state, assets \
                     FROM alerts ORDER BY scheduled_iso, token",
                )
                .map_err(|e| AlertError::Storage(format!("cannot prepare load: {e}")))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| AlertError::Storage(format!("cannot load alerts: {e}")))?;

            let mut records = Vec::new();
            for row in rows {
                let (token, type_name, scheduled_iso, state, assets) =
                    row.map_err(|e| AlertError::Storage(format!("cannot read alert row: {e}")))?;

                let state = match AlertState::parse(&state) {
                    Some(state) => state,
                    None => {
                        warn!(%token, %state, "unknown persisted state, treating as set");
                        AlertState::Set
                    }
                };
                let assets = serde_json::from_str(&assets).unwrap_or_else(|e| {
                    warn!(%token, "unreadable asset metadata, using defaults: {e}");
                    Default::default()
                });

                records.push(AlertRecord {
                    token,
                    type_name,
                    scheduled_iso,
                    state,
                    assets,
                });
            }
            Ok(records)
        })
    }

    fn store(&self, record: &AlertRecord) -> Result<()> {
        self.with_conn(|conn| {
            let assets = assets_json(record)?;
            conn.execute(
                "INSERT INTO alerts (token, type_name, scheduled_iso, state, assets) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.token,
                    record.type_name,
                    record.scheduled_iso,
                    record.state.as_str(),
                    assets
                ],
            )
            .map_err(|e| AlertError::Storage(format!("cannot store alert: {e}")))?;
            Ok(())
        })
    }

    fn modify(&self, record: &AlertRecord) -> Result<()> {
        self.with_conn(|conn| {
            let assets = assets_json(record)?;
            let rows = conn
                .execute(
                    "UPDATE alerts SET type_name = ?1, scheduled_iso = ?2, state = ?3, \
                     assets = ?4 WHERE token = ?5",
                    params![
                        record.type_name,
                        record.scheduled_iso,
                        record.state.as_str(),
                        assets,
                        record.token
                    ],
                )
                .map_err(|e| AlertError::Storage(format!("cannot modify alert: {e}")))?;

            if rows == 0 {
                return Err(AlertError::Storage(format!(
                    "no row to modify for token '{}'",
                    record.token
                )));
            }
            Ok(())
        })
    }

    fn erase(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            let rows = conn
                .execute("DELETE FROM alerts WHERE token = ?1", params![token])
                .map_err(|e| AlertError::Storage(format!("cannot erase alert: {e}")))?;
            if rows == 0 {
                debug!(%token, "erase found no row");
            }
            Ok(())
        })
    }

    fn bulk_erase(&self, tokens: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            let mut failures = 0usize;
            for token in tokens {
                if let Err(e) = conn.execute("DELETE FROM alerts WHERE token = ?1", params![token])
                {
                    warn!(%token, "bulk erase failed for row: {e}");
                    failures += 1;
                }
            }
            if failures > 0 {
                return Err(AlertError::Storage(format!(
                    "bulk erase failed for {failures} of {} rows",
                    tokens.len()
                )));
            }
            Ok(())
        })
    }
}

fn assets_json(record: &AlertRecord) -> Result<String> {
    serde_json::to_string(&record.assets)
        .map_err(|e| AlertError::Storage(format!("cannot serialize assets: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::alert::{AssetConfig, AssetRecord};

    fn record(token: &str, iso: &str) -> AlertRecord {
        AlertRecord {
            token: token.to_owned(),
            type_name: "ALARM".to_owned(),
            scheduled_iso: iso.to_owned(),
            state: AlertState::Set,
            assets: AssetConfig::default(),
        }
    }

    fn open_storage(dir: &tempfile::TempDir) -> SqliteAlertStorage {
        let storage = SqliteAlertStorage::new(dir.path().join("alerts.db"));
        storage.create_database().expect("create database");
        storage
    }

    #[test]
    fn open_fails_when_database_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteAlertStorage::new(dir.path().join("alerts.db"));
        assert!(storage.open().is_err());
    }

    #[test]
    fn create_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.db");

        let storage = SqliteAlertStorage::new(path.clone());
        storage.create_database().unwrap();
        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();

        let reopened = SqliteAlertStorage::new(path);
        reopened.open().unwrap();
        let records = reopened.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token, "tok-1");
    }

    #[test]
    fn store_rejects_duplicate_token() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();
        let duplicate = storage.store(&record("tok-1", "2026-08-02T11:00:00+00:00"));
        assert!(matches!(duplicate, Err(AlertError::Storage(_))));
    }

    #[test]
    fn modify_updates_existing_row() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();

        let mut updated = record("tok-1", "2026-08-02T12:00:00+00:00");
        updated.state = AlertState::Active;
        storage.modify(&updated).unwrap();

        let records = storage.load().unwrap();
        assert_eq!(records[0].scheduled_iso, "2026-08-02T12:00:00+00:00");
        assert_eq!(records[0].state, AlertState::Active);
    }

    #[test]
    fn modify_missing_row_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);
        let result = storage.modify(&record("ghost", "2026-08-02T10:00:00+00:00"));
        assert!(matches!(result, Err(AlertError::Storage(_))));
    }

    #[test]
    fn erase_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();
        storage.erase("tok-1").unwrap();
        storage.erase("tok-1").unwrap();
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn bulk_erase_removes_all_listed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();
        storage
            .store(&record("tok-2", "2026-08-02T11:00:00+00:00"))
            .unwrap();

        storage
            .bulk_erase(&[
                "tok-1".to_owned(),
                "missing".to_owned(),
                "tok-2".to_owned(),
            ])
            .unwrap();
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn clear_database_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        storage
            .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
            .unwrap();
        storage.clear_database().unwrap();

        assert!(storage.load().unwrap().is_empty());
        // Still usable after the clear.
        storage
            .store(&record("tok-2", "2026-08-02T11:00:00+00:00"))
            .unwrap();
        assert_eq!(storage.load().unwrap().len(), 1);
    }

    #[test]
    fn asset_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&dir);

        let mut stored = record("tok-1", "2026-08-02T10:00:00+00:00");
        stored.assets = AssetConfig {
            assets: vec![AssetRecord {
                id: "chime".to_owned(),
                url: "https://example.com/chime.mp3".to_owned(),
            }],
            loop_count: 2,
            loop_pause_ms: 250,
            background_asset: Some("chime".to_owned()),
        };
        storage.store(&stored).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded[0].assets, stored.assets);
    }

    #[test]
    fn operations_before_open_fail() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteAlertStorage::new(dir.path().join("alerts.db"));
        assert!(storage.load().is_err());
        assert!(
            storage
                .store(&record("tok-1", "2026-08-02T10:00:00+00:00"))
                .is_err()
        );
    }
}
