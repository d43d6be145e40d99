//! Persisted key-value storage trait and its backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String-keyed, string-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  fn remove_item(&self, key: &str) -> Result<()>;

  /// Remove every key.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't keep anything.
/// Used when caching is disabled - every read misses.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
  fn get_item(&self, _key: &str) -> Result<Option<String>> {
    Ok(None) // Always miss
  }

  fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_item(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// In-process storage; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
  items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
    self.items.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl KeyValueStore for MemoryStore {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    Ok(self.items()?.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self.items()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    self.items()?.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.items()?.clear();
    Ok(())
  }
}

/// SQLite-based key-value storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open (or create) the store for the given backend.
  ///
  /// Without an explicit path the file lives in the data directory and is
  /// named after a fingerprint of `base_url`.
  pub fn open(explicit_path: Option<&Path>, base_url: &str) -> Result<Self> {
    let path = match explicit_path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path(base_url)?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Store backed by an in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path for a backend.
  fn default_path(base_url: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(
      data_dir
        .join("engage")
        .join(format!("cache-{}.db", backend_fingerprint(base_url))),
    )
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Short stable fingerprint of a backend URL.
pub fn backend_fingerprint(base_url: &str) -> String {
  let normalized = base_url.trim().trim_end_matches('/').to_lowercase();
  let mut hasher = Sha256::new();
  hasher.update(normalized.as_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..16].to_string()
}

impl KeyValueStore for SqliteStore {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache key {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write cache key {}: {}", key, e))?;
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove cache key {}: {}", key, e))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv_store", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;
    Ok(())
  }
}
