use rusqlite::Connection;
use crate::db::immediate;
use crate::error::QueueError;
use crate::models::{is_command, BlacklistEntry};
use crate::repo::task::is_valid_pkgbase;

/// Packages the port refuses to build
///
/// Enqueue rejects blacklisted names, and workers prune any that were queued
/// before the ban when they start.
pub struct BlacklistRepo;

impl BlacklistRepo {
    /// Ban packages; returns how many were not banned before
    ///
    /// A given reason replaces the stored one; `None` keeps it.
    pub fn add(
        conn: &Connection,
        pkgbases: &[String],
        reason: Option<&str>,
    ) -> Result<usize, QueueError> {
        for pkgbase in pkgbases {
            if is_command(pkgbase) || !is_valid_pkgbase(pkgbase) {
                return Err(QueueError::InvalidPkgbase(pkgbase.clone()));
            }
        }

        let tx = immediate(conn)?;
        let now = chrono::Utc::now().timestamp();
        let mut added = 0;
        for pkgbase in pkgbases {
            if Self::contains(&tx, pkgbase)? {
                if let Some(reason) = reason {
                    tx.execute(
                        "UPDATE blacklist SET reason = ?1 WHERE pkgbase = ?2",
                        rusqlite::params![reason, pkgbase],
                    )?;
                }
                continue;
            }
            tx.execute(
                "INSERT INTO blacklist (pkgbase, reason, added_ts) VALUES (?1, ?2, ?3)",
                rusqlite::params![pkgbase, reason, now],
            )?;
            added += 1;
        }
        tx.commit()?;
        log::info!("blacklisted {} new package(s)", added);
        Ok(added)
    }

    /// Lift bans; returns the names that were actually removed
    pub fn remove(conn: &Connection, pkgbases: &[String]) -> Result<Vec<String>, QueueError> {
        let tx = immediate(conn)?;
        let mut removed = Vec::new();
        for pkgbase in pkgbases {
            if tx.execute("DELETE FROM blacklist WHERE pkgbase = ?1", [pkgbase])? > 0 {
                removed.push(pkgbase.clone());
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn list(conn: &Connection) -> Result<Vec<BlacklistEntry>, QueueError> {
        let mut stmt = conn.prepare(
            "SELECT pkgbase, reason, added_ts FROM blacklist ORDER BY pkgbase",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BlacklistEntry {
                pkgbase: row.get(0)?,
                reason: row.get(1)?,
                added_ts: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn contains(conn: &Connection, pkgbase: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blacklist WHERE pkgbase = ?1)",
            [pkgbase],
            |row| row.get(0),
        )
    }

    /// Delete waiting rows of blacklisted packages from every tasklist
    ///
    /// Rows already building are left to finish. Returns the pruned names.
    pub fn prune_queue(conn: &Connection) -> Result<Vec<String>, QueueError> {
        let tx = immediate(conn)?;
        let pruned = {
            let mut stmt = tx.prepare(
                "SELECT pkgbase FROM tasks
                 WHERE tasklist != 0 AND info IS NULL
                   AND pkgbase IN (SELECT pkgbase FROM blacklist)
                 ORDER BY tasklist, taskno",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        if !pruned.is_empty() {
            tx.execute(
                "DELETE FROM tasks
                 WHERE tasklist != 0 AND info IS NULL
                   AND pkgbase IN (SELECT pkgbase FROM blacklist)",
                [],
            )?;
            log::info!("pruned blacklisted task(s): {}", pruned.join(", "));
        }
        tx.commit()?;
        Ok(pruned)
    }
}
