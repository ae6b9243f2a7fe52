//! Key/value storage that survives restarts.
//!
//! Filters, the data-mode preference and the persisted query cache are all
//! stored as strings under well-known keys, the way a browser dashboard would
//! use local storage. The SQLite implementation keeps everything in a single
//! table inside the data directory.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage key for the persisted filter state.
pub const FILTERS_KEY: &str = "dashboardFilters";

/// Storage key for the data-mode preference.
pub const DATA_MODE_KEY: &str = "dataMode";

/// String key/value storage backend.
pub trait LocalStorage: Send + Sync {
  /// Read the value stored under `key`.
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove_item(&self, key: &str) -> Result<()>;
}

/// Storage that keeps nothing.
/// Used when persistence is disabled or the database could not be opened.
pub struct NoopStorage;

impl LocalStorage for NoopStorage {
  fn get_item(&self, _key: &str) -> Result<Option<String>> {
    Ok(None)
  }

  fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(())
  }

  fn remove_item(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-backed storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
  /// Upper bound on the total stored bytes, mirroring a browser storage quota
  max_bytes: Option<usize>,
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStorage {
  /// Open the storage database at `path`, or at the default location.
  pub fn open(path: Option<&Path>, max_bytes: Option<usize>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open storage at {}: {}", path.display(), e))?;

    Self::from_connection(conn, max_bytes)
  }

  /// Open a throwaway in-memory database.
  #[cfg(test)]
  pub fn in_memory(max_bytes: Option<usize>) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory storage: {}", e))?;
    Self::from_connection(conn, max_bytes)
  }

  fn from_connection(conn: Connection, max_bytes: Option<usize>) -> Result<Self> {
    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      max_bytes,
    })
  }

  fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("storage.db"))
  }
}

impl LocalStorage for SqliteStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read '{}': {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(max_bytes) = self.max_bytes {
      let others: i64 = conn
        .query_row(
          "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM local_storage WHERE key != ?",
          params![key],
          |row| row.get(0),
        )
        .map_err(|e| eyre!("Failed to measure storage usage: {}", e))?;

      let total = others as usize + value.len();
      if total > max_bytes {
        return Err(eyre!(
          "Storage quota exceeded writing '{}': {} bytes > {} bytes",
          key,
          total,
          max_bytes
        ));
      }
    }

    conn
      .execute(
        "INSERT OR REPLACE INTO local_storage (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write '{}': {}", key, e))?;

    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM local_storage WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove '{}': {}", key, e))?;

    Ok(())
  }
}
