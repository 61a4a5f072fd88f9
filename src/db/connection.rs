use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::db::migrations::MigrationManager;

/// How long a writer waits for a competing worker's transaction to finish
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection manager
///
/// Every worker process opens its own connection. Connections are plain
/// values: dropping one closes it, and any transaction still open on it is
/// rolled back.
pub struct DbConnection;

impl DbConnection {
    /// Get the default database path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Config::config_dir()?.join("ledger.db"))
    }

    /// Get database path from configuration or default
    pub fn resolve_path(config: &Config) -> Result<PathBuf> {
        match &config.data_location {
            Some(path) => Ok(path.clone()),
            None => Self::default_path(),
        }
    }

    /// Connect using the rc file in the current home directory
    pub fn connect() -> Result<Connection> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::connect_with(&config)
    }

    pub fn connect_with(config: &Config) -> Result<Connection> {
        let db_path = Self::resolve_path(config)?;
        Self::open(&db_path)
    }

    /// Open a database file, creating it and parent directories if needed
    pub fn open(db_path: &Path) -> Result<Connection> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set database busy timeout")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL journal")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        MigrationManager::initialize(&conn)
            .context("Failed to initialize database schema")?;

        log::debug!("opened database {}", db_path.display());
        Ok(conn)
    }

    /// Connect to an in-memory database (for testing)
    pub fn connect_in_memory() -> Result<Connection> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        MigrationManager::initialize(&conn)
            .context("Failed to initialize database schema")?;

        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_path_prefers_config() {
        let config = Config {
            data_location: Some(PathBuf::from("/srv/loongshot/ledger.db")),
            ..Config::default()
        };
        let path = DbConnection::resolve_path(&config).unwrap();
        assert_eq!(path, PathBuf::from("/srv/loongshot/ledger.db"));
    }

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("ledger.db");

        let conn = DbConnection::open(&db_path).unwrap();
        assert!(db_path.exists());

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db");

        drop(DbConnection::open(&db_path).unwrap());
        let conn = DbConnection::open(&db_path).unwrap();
        let version = MigrationManager::get_version(&conn).unwrap();
        assert_eq!(version, crate::db::migrations::CURRENT_VERSION);
    }

    #[test]
    fn test_connect_in_memory() {
        let conn = DbConnection::connect_in_memory().unwrap();

        let version = MigrationManager::get_version(&conn).unwrap();
        assert_eq!(version, crate::db::migrations::CURRENT_VERSION);
    }
}
