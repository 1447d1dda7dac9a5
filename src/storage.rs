//! Storage backends with a common save/load interface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::cli::StorageBackend;
use crate::util::ensure_directory;

/// Common interface for persisting ingested records.
pub trait Storage {
    fn save(&mut self, records: &[Value]) -> Result<()>;
    /// Load previously saved records. Returns an empty list when nothing was
    /// saved.
    fn load(&self) -> Result<Vec<Value>>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Vec<Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save(&mut self, records: &[Value]) -> Result<()> {
        self.records = records.to_vec();
        Ok(())
    }

    fn load(&self) -> Result<Vec<Value>> {
        Ok(self.records.clone())
    }
}

/// SQLite-backed storage: the record list is stored as one JSON blob row,
/// replaced wholesale on save.
#[derive(Debug)]
pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open storage database: {}", path.display()))?;
        connection
            .execute("CREATE TABLE IF NOT EXISTS records (data TEXT)", [])
            .context("failed to create records table")?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("failed to open storage database: {}", self.path.display()))
    }
}

impl Storage for SqliteStorage {
    fn save(&mut self, records: &[Value]) -> Result<()> {
        let data =
            serde_json::to_string(records).context("failed to serialize records for storage")?;

        let connection = self.connect()?;
        connection
            .execute("DELETE FROM records", [])
            .context("failed to clear records table")?;
        connection
            .execute("INSERT INTO records (data) VALUES (?1)", params![data])
            .context("failed to insert records")?;

        Ok(())
    }

    fn load(&self) -> Result<Vec<Value>> {
        let connection = self.connect()?;
        let row: Option<String> = connection
            .query_row("SELECT data FROM records LIMIT 1", [], |row| row.get(0))
            .optional()
            .context("failed to query records")?;

        match row {
            None => Ok(Vec::new()),
            Some(data) => {
                serde_json::from_str(&data).context("failed to parse stored records json")
            }
        }
    }
}

/// Open a storage backend by configuration.
pub fn open_storage(backend: StorageBackend, path: Option<&Path>) -> Result<Box<dyn Storage>> {
    match backend {
        StorageBackend::Memory => Ok(Box::new(MemoryStorage::new())),
        StorageBackend::Sqlite => {
            let path = path.context("sqlite backend requires --storage-path")?;
            Ok(Box::new(SqliteStorage::open(path)?))
        }
    }
}
