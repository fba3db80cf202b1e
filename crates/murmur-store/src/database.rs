//! SQLite-backed [`KeyValue`] store.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] behind a mutex and
//! guarantees that migrations are run before any other operation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::kv::{versioned_key, KeyValue};
use crate::migrations;
use crate::models::VersionedObject;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/murmur/murmur.db`
    /// - macOS:   `~/Library/Application Support/net.murmur.murmur/murmur.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\murmur\murmur\data\murmur.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("net", "murmur", "murmur").ok_or(StoreError::NoDataDir)?;
        Self::open_in_dir(project_dirs.data_dir())
    }

    /// Open (or create) `murmur.db` inside `dir`, creating the directory.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join("murmur.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        let conn = self.conn().ok()?;
        conn.path().filter(|p| !p.is_empty()).map(PathBuf::from)
    }
}

impl KeyValue for Database {
    fn get(&self, key: &str, version: u64) -> Result<VersionedObject> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT version, timestamp, data FROM kv WHERE key = ?1",
                params![versioned_key(key, version)],
                |row| {
                    let version: i64 = row.get(0)?;
                    let ts: String = row.get(1)?;
                    let data: Vec<u8> = row.get(2)?;
                    Ok((version, ts, data))
                },
            )
            .optional()?;

        let (version, ts, data) = row.ok_or(StoreError::NotFound)?;
        Ok(VersionedObject {
            version: version as u64,
            timestamp: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
            data,
        })
    }

    fn set(&self, key: &str, object: &VersionedObject) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, version, timestamp, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                version = excluded.version,
                timestamp = excluded.timestamp,
                data = excluded.data",
            params![
                versioned_key(key, object.version),
                object.version as i64,
                object.timestamp.to_rfc3339(),
                object.data,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str, version: u64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM kv WHERE key = ?1",
            params![versioned_key(key, version)],
        )?;
        Ok(())
    }
}
