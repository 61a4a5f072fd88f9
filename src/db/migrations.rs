use rusqlite::{Connection, Result};
use std::collections::HashMap;

/// Current database schema version
pub const CURRENT_VERSION: u32 = 3;

/// Migration system for managing database schema versions
pub struct MigrationManager;

impl MigrationManager {
    /// Initialize the database with the current schema
    /// This creates the schema_version table and applies all migrations
    pub fn initialize(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )?;

        let current_version = Self::get_version(conn)?;

        for version in (current_version + 1)..=CURRENT_VERSION {
            Self::apply_migration(conn, version)?;
        }

        Ok(())
    }

    /// Apply a specific migration by version number
    fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
        let migrations = get_migrations();
        if let Some(migration) = migrations.get(&version) {
            // Immediate so that two workers starting at once do not both
            // try to create the same tables
            let tx = crate::db::immediate(conn)?;
            let applied: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_version WHERE version = ?1)",
                [version],
                |row| row.get(0),
            )?;
            if !applied {
                migration(&tx)?;
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [version],
                )?;
                log::info!("applied schema migration v{}", version);
            }
            tx.commit()?;
            Ok(())
        } else {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some(format!("No migration found for version {}", version)),
            ))
        }
    }

    /// Get the current schema version
    pub fn get_version(conn: &Connection) -> Result<u32> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

/// Get all migrations indexed by version
fn get_migrations() -> HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> {
    let mut migrations: HashMap<u32, fn(&rusqlite::Transaction) -> Result<(), rusqlite::Error>> = HashMap::new();
    migrations.insert(1, migration_v1);
    migrations.insert(2, migration_v2);
    migrations.insert(3, migration_v3);
    migrations
}

/// Migration v1: package ledger, builders and build-attempt logs
fn migration_v1(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE builders (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            scale REAL NOT NULL DEFAULT 1.0
        )",
        [],
    )?;
    // Attempts from unregistered machines are attributed to builder 1
    tx.execute(
        "INSERT INTO builders (id, name, scale) VALUES (1, 'unknown', 1.0)",
        [],
    )?;

    tx.execute(
        "CREATE TABLE packages (
            base TEXT PRIMARY KEY,
            repo TEXT NULL,
            flags INTEGER NOT NULL DEFAULT 0,
            timecost REAL NULL,
            log_version TEXT NULL,
            x86_version TEXT NULL,
            x86_testing_version TEXT NULL,
            x86_staging_version TEXT NULL,
            loong_version TEXT NULL,
            loong_testing_version TEXT NULL,
            loong_staging_version TEXT NULL
        )",
        [],
    )?;
    // Note: flags >> 16 holds the failure category; see models::flags

    tx.execute(
        "CREATE TABLE logs (
            id INTEGER PRIMARY KEY,
            pkgbase TEXT NOT NULL,
            builder INTEGER NOT NULL DEFAULT 1 REFERENCES builders(id),
            build_result INTEGER NOT NULL,
            build_time INTEGER NOT NULL
        )",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_logs_pkgbase_time ON logs(pkgbase, build_time)",
        [],
    )?;

    Ok(())
}

/// Migration v2: rebuild task queue
fn migration_v2(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE tasks (
            id INTEGER PRIMARY KEY,
            taskno INTEGER NOT NULL,
            pkgbase TEXT NOT NULL,
            taskid INTEGER NOT NULL,
            tasklist INTEGER NOT NULL,
            repo INTEGER NOT NULL DEFAULT 0 CHECK(repo IN (0, 1, 2)),
            info TEXT NULL,
            logid INTEGER NULL REFERENCES logs(id) ON DELETE SET NULL,
            created_ts INTEGER NOT NULL
        )",
        [],
    )?;
    // tasklist = 0 marks retired rows, which keep their taskno for history
    tx.execute(
        "CREATE UNIQUE INDEX ux_tasks_live_taskno ON tasks(tasklist, taskno) WHERE tasklist != 0",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_tasks_pkgbase ON tasks(pkgbase, tasklist)",
        [],
    )?;
    tx.execute(
        "CREATE INDEX idx_tasks_taskid ON tasks(taskid)",
        [],
    )?;

    Ok(())
}

/// Migration v3: packages banned from the queue
fn migration_v3(tx: &rusqlite::Transaction) -> Result<(), rusqlite::Error> {
    tx.execute(
        "CREATE TABLE blacklist (
            pkgbase TEXT PRIMARY KEY,
            reason TEXT NULL,
            added_ts INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
