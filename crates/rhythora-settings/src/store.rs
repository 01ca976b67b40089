//! Durable key/value storage.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use directories::ProjectDirs;
use parking_lot::Mutex;
use rhythora_core::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// String key/value persistence.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// `SQLite`-backed store in the platform data directory.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the store at the default per-user location.
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "rhythora", "Rhythora")
            .ok_or_else(|| Error::Database("Failed to determine data directory".to_string()))?;

        Self::with_path(project_dirs.data_dir())
    }

    /// Open (or create) the store inside `data_dir`.
    pub fn with_path(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| Error::Database(format!("Failed to create data directory: {e}")))?;

        let db_path = data_dir.join("settings.db");
        let db = Connection::open(&db_path)
            .map_err(|e| Error::Database(format!("Failed to open database: {e}")))?;

        db.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| Error::Database(format!("Failed to initialize database: {e}")))?;

        info!("Settings store opened at {}", db_path.display());

        Ok(Self { db: Mutex::new(db) })
    }
}

impl SettingsStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        db.query_row("SELECT value FROM kv_store WHERE key = ?", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| Error::Database(format!("Failed to read {key}: {e}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to store {key}: {e}")))?;
        debug!("Stored {key} ({} bytes)", value.len());
        Ok(())
    }
}

/// Volatile store, for tests and for running without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
