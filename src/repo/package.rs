use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use crate::build::classify::{self, LogReport};
use crate::db::immediate;
use crate::error::LedgerError;
use crate::models::flags::{self, FlagDelta};
use crate::models::{Channel, PackageRecord, SyncEntry};
use crate::repo::{AttemptRepo, BuilderRepo};

const PACKAGE_COLUMNS: &str = "base, repo, flags, timecost, log_version,
    x86_version, x86_testing_version, x86_staging_version,
    loong_version, loong_testing_version, loong_staging_version";

/// Outcome of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
}

/// Outcome of applying a finished log to the ledger
#[derive(Debug, Clone)]
pub struct AppliedLog {
    pub flags: u32,
    pub log_id: i64,
    pub report: LogReport,
}

/// Package ledger repository
///
/// Flag writes are always relative (`(old | add) & !remove`) and happen
/// inside an immediate transaction, so concurrent reporters touching
/// different bit groups of the same package never lose each other's updates.
pub struct PackageRepo;

impl PackageRepo {
    /// Current flags of a package
    pub fn read(conn: &Connection, base: &str) -> Result<Option<u32>, LedgerError> {
        let flags = conn
            .query_row("SELECT flags FROM packages WHERE base = ?1", [base], |row| row.get(0))
            .optional()?;
        Ok(flags)
    }

    pub fn get(conn: &Connection, base: &str) -> Result<Option<PackageRecord>, LedgerError> {
        let record = conn
            .query_row(
                &format!("SELECT {} FROM packages WHERE base = ?1", PACKAGE_COLUMNS),
                [base],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Apply `add` and `remove` masks to an existing package
    ///
    /// Clearing the fail bit also clears the error code. Returns the new
    /// flags.
    pub fn update_bits(conn: &Connection, base: &str, add: u32, remove: u32) -> Result<u32, LedgerError> {
        let tx = immediate(conn)?;
        let old = Self::read(&tx, base)?.ok_or_else(|| LedgerError::NotFound(base.to_string()))?;
        let new = flags::apply(old, add, remove);
        tx.execute(
            "UPDATE packages SET flags = ?1 WHERE base = ?2",
            rusqlite::params![new, base],
        )?;
        tx.commit()?;
        log::info!("flags for {}: {:#x} -> {:#x}", base, old, new);
        Ok(new)
    }

    /// Record a build result inside a caller-owned transaction
    ///
    /// Creates the row when the package is not in the ledger yet. `None`
    /// values keep what is stored. Returns the new flags.
    pub fn report_build_in(
        conn: &Connection,
        base: &str,
        delta: FlagDelta,
        log_version: Option<&str>,
        timecost: Option<f64>,
    ) -> Result<u32, LedgerError> {
        let old = Self::read(conn, base)?.unwrap_or(0);
        let new = delta.apply(old);
        conn.execute(
            "INSERT INTO packages (base, flags, log_version, timecost) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(base) DO UPDATE SET
                flags = excluded.flags,
                log_version = COALESCE(excluded.log_version, packages.log_version),
                timecost = COALESCE(excluded.timecost, packages.timecost)",
            rusqlite::params![base, new, log_version, timecost],
        )?;
        log::debug!("ledger {}: {:#x} -> {:#x}", base, old, new);
        Ok(new)
    }

    /// Record the version a channel of the port now carries
    ///
    /// The next rebuild of the same upstream release bumps past it.
    pub fn record_built_version(
        conn: &Connection,
        base: &str,
        channel: Channel,
        version: &str,
    ) -> Result<(), LedgerError> {
        let column = match channel {
            Channel::Stable => "loong_version",
            Channel::Testing => "loong_testing_version",
            Channel::Staging => "loong_staging_version",
        };
        conn.execute(
            &format!("UPDATE packages SET {} = ?1 WHERE base = ?2", column),
            rusqlite::params![version, base],
        )?;
        Ok(())
    }

    /// Replace the ledger's package set with a repository snapshot
    ///
    /// Listed packages are upserted with their versions and keep their flags;
    /// packages missing from the snapshot are deleted.
    pub fn sync(conn: &Connection, entries: &[SyncEntry]) -> Result<SyncReport, LedgerError> {
        let tx = immediate(conn)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO packages (base, repo, flags,
                    x86_version, x86_testing_version, x86_staging_version,
                    loong_version, loong_testing_version, loong_staging_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(base) DO UPDATE SET
                    repo = excluded.repo,
                    flags = packages.flags | ?3,
                    x86_version = excluded.x86_version,
                    x86_testing_version = excluded.x86_testing_version,
                    x86_staging_version = excluded.x86_staging_version,
                    loong_version = excluded.loong_version,
                    loong_testing_version = excluded.loong_testing_version,
                    loong_staging_version = excluded.loong_staging_version",
            )?;
            for entry in entries {
                stmt.execute(rusqlite::params![
                    entry.base,
                    entry.repo,
                    flags::SYNC_MARK,
                    entry.x86_version,
                    entry.x86_testing_version,
                    entry.x86_staging_version,
                    entry.loong_version,
                    entry.loong_testing_version,
                    entry.loong_staging_version,
                ])?;
            }
        }

        let removed = tx.execute(
            "DELETE FROM packages WHERE flags & ?1 = 0",
            [flags::SYNC_MARK],
        )?;
        tx.execute(
            "UPDATE packages SET flags = flags & ?1",
            [!flags::SYNC_MARK],
        )?;
        tx.commit()?;

        log::info!("sync: {} package(s) upserted, {} removed", entries.len(), removed);
        Ok(SyncReport {
            upserted: entries.len(),
            removed,
        })
    }

    /// Apply a finished build log to an existing package and record an attempt
    ///
    /// `builder` overrides the builder named in the log trailer.
    pub fn apply_log(
        conn: &Connection,
        base: &str,
        text: &str,
        builder: Option<&str>,
    ) -> Result<AppliedLog, LedgerError> {
        let report = classify::scan(text);
        let builder = builder
            .map(str::to_string)
            .or_else(|| report.builder.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let tx = immediate(conn)?;
        if Self::read(&tx, base)?.is_none() {
            return Err(LedgerError::NotFound(base.to_string()));
        }
        let scale = BuilderRepo::scale(&tx, &builder)?;
        let timecost = report.time_cost.map(|secs| secs * scale);
        let flags = Self::report_build_in(&tx, base, report.ledger_delta(report.finished), None, timecost)?;
        let log_id = AttemptRepo::record_attempt(&tx, base, &builder, flags)?;
        tx.commit()?;

        log::info!("applied log for {}: flags {:#x}", base, flags);
        Ok(AppliedLog { flags, log_id, report })
    }

    /// Packages whose fail bit is set, with their error code
    pub fn failed(conn: &Connection) -> Result<Vec<PackageRecord>, LedgerError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE flags & ?1 != 0 ORDER BY base",
            PACKAGE_COLUMNS
        ))?;
        let rows = stmt.query_map([flags::FAIL], Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<PackageRecord> {
        Ok(PackageRecord {
            base: row.get(0)?,
            repo: row.get(1)?,
            flags: row.get(2)?,
            timecost: row.get(3)?,
            log_version: row.get(4)?,
            x86_version: row.get(5)?,
            x86_testing_version: row.get(6)?,
            x86_staging_version: row.get(7)?,
            loong_version: row.get(8)?,
            loong_testing_version: row.get(9)?,
            loong_staging_version: row.get(10)?,
        })
    }
}
