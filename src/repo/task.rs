use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use crate::db::immediate;
use crate::error::QueueError;
use crate::models::{is_command, Channel, InsertMode, Task, TaskInfo};
use crate::models::flags;
use crate::repo::BlacklistRepo;

/// Window in which an attempt-log row is attributed to a finishing task
const LOG_LINK_WINDOW_SECS: i64 = 3600;

const TASK_COLUMNS: &str = "id, taskno, pkgbase, taskid, tasklist, repo, info, logid, created_ts";

/// Result of a successful enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub taskid: i64,
    pub first_taskno: i64,
    pub count: usize,
}

/// What a worker got from its tasklist
#[derive(Debug, Clone)]
pub enum Dequeued {
    Package(Task),
    Command(Task),
    /// Nothing waiting here, but live tasks remain somewhere
    Stop,
    /// No live tasks anywhere
    Drained,
}

/// Terminal transition applied to a building task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    Done,
    Failed(u8),
    NoLog,
    Skipped,
    Remove,
}

/// One enqueue batch, for replaying history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryBatch {
    pub taskid: i64,
    pub tasks: Vec<Task>,
}

/// Per-tasklist counts of live rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TasklistSummary {
    pub tasklist: i64,
    pub waiting: i64,
    pub building: i64,
    pub total: i64,
}

/// Task queue repository
///
/// The queue is a set of tasklists stored in one table. Rows of a tasklist are
/// dequeued in `taskno` order. A package may only be live (`tasklist != 0`) in
/// one place at a time; command rows (pkgbase starting with `%`) are exempt.
///
/// Every mutating operation runs inside a `BEGIN IMMEDIATE` transaction so that
/// several worker processes sharing the database never see each other's
/// half-applied writes, and never dequeue the same row.
pub struct TaskRepo;

impl TaskRepo {
    /// Add a batch of packages to a tasklist
    ///
    /// The batch is rejected as a whole if any non-command pkgbase is
    /// blacklisted or already live in any tasklist. A name given twice in one
    /// batch conflicts too. Every call gets a fresh batch id.
    pub fn enqueue(
        conn: &Connection,
        pkgbases: &[String],
        tasklist: i64,
        channel: Channel,
        mode: InsertMode,
    ) -> Result<EnqueueReport, QueueError> {
        if tasklist <= 0 {
            return Err(QueueError::InvalidTasklist(tasklist));
        }
        if pkgbases.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        for pkgbase in pkgbases {
            if !is_valid_pkgbase(pkgbase) {
                return Err(QueueError::InvalidPkgbase(pkgbase.clone()));
            }
        }

        let tx = immediate(conn)?;

        let mut banned: Vec<String> = Vec::new();
        for pkgbase in pkgbases.iter().filter(|p| !is_command(p)) {
            if BlacklistRepo::contains(&tx, pkgbase)? && !banned.contains(pkgbase) {
                banned.push(pkgbase.clone());
            }
        }
        if !banned.is_empty() {
            return Err(QueueError::Blacklisted(banned));
        }

        let mut seen = HashSet::new();
        let mut conflicts: Vec<String> = Vec::new();
        for pkgbase in pkgbases.iter().filter(|p| !is_command(p)) {
            let duplicate = !seen.insert(pkgbase.as_str());
            if duplicate || Self::is_live(&tx, pkgbase)? {
                if !conflicts.contains(pkgbase) {
                    conflicts.push(pkgbase.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(QueueError::Conflict(conflicts));
        }

        let count = pkgbases.len() as i64;
        let start = match mode {
            InsertMode::Append => Self::append_point(&tx, tasklist)?,
            InsertMode::Top => match Self::first_waiting_taskno(&tx, tasklist)? {
                Some(point) => {
                    Self::shift_from(&tx, tasklist, point, count)?;
                    point
                }
                None => Self::append_point(&tx, tasklist)?,
            },
            InsertMode::At(point) => {
                let point = point.max(1);
                Self::shift_from(&tx, tasklist, point, count)?;
                point
            }
        };

        let taskid: i64 = tx.query_row(
            "SELECT COALESCE(MAX(taskid), 0) + 1 FROM tasks",
            [],
            |row| row.get(0),
        )?;
        let now = chrono::Utc::now().timestamp();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO tasks (taskno, pkgbase, taskid, tasklist, repo, info, created_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            )?;
            for (offset, pkgbase) in pkgbases.iter().enumerate() {
                stmt.execute(rusqlite::params![
                    start + offset as i64,
                    pkgbase,
                    taskid,
                    tasklist,
                    channel.as_i64(),
                    now
                ])?;
            }
        }

        tx.commit()?;
        log::info!(
            "queued {} task(s) on list {} at #{} (batch {})",
            count, tasklist, start, taskid
        );

        Ok(EnqueueReport {
            taskid,
            first_taskno: start,
            count: pkgbases.len(),
        })
    }

    /// Take the next waiting task of a tasklist
    ///
    /// With `mark_building` the row is claimed in the same transaction: package
    /// rows become `building`, command rows `command`. Without it this is a
    /// read-only peek.
    ///
    /// When nothing is waiting and `mark_building` is set, the finalized rows of
    /// the tasklist are retired first. The result is then `Stop` if any live
    /// row remains anywhere, otherwise `Drained`. A peek reports the same
    /// answer without retiring anything.
    pub fn dequeue(
        conn: &Connection,
        tasklist: i64,
        mark_building: bool,
    ) -> Result<Dequeued, QueueError> {
        if !mark_building {
            return match Self::next_waiting(conn, tasklist)? {
                Some(task) if task.is_command() => Ok(Dequeued::Command(task)),
                Some(task) => Ok(Dequeued::Package(task)),
                None if Self::live_beyond_finished(conn, tasklist)? => Ok(Dequeued::Stop),
                None => Ok(Dequeued::Drained),
            };
        }

        let tx = immediate(conn)?;

        if let Some(mut task) = Self::next_waiting(&tx, tasklist)? {
            let state = if task.is_command() {
                TaskInfo::Command
            } else {
                TaskInfo::Building
            };
            tx.execute(
                "UPDATE tasks SET info = ?1 WHERE id = ?2 AND info IS NULL",
                rusqlite::params![state.to_column(), task.id],
            )?;
            tx.commit()?;

            task.info = state;
            log::debug!("list {}: claimed #{} {}", tasklist, task.taskno, task.pkgbase);
            return Ok(if task.is_command() {
                Dequeued::Command(task)
            } else {
                Dequeued::Package(task)
            });
        }

        let retired = tx.execute(
            "UPDATE tasks SET tasklist = 0
             WHERE tasklist = ?1 AND info IS NOT NULL AND info NOT IN ('building', 'command')",
            [tasklist],
        )?;
        if retired > 0 {
            log::info!("list {}: retired {} finished task(s)", tasklist, retired);
        }
        let live = Self::any_live(&tx)?;
        tx.commit()?;

        Ok(if live { Dequeued::Stop } else { Dequeued::Drained })
    }

    /// Record the outcome of a building task
    ///
    /// Returns whether a row changed. Only `building` rows transition, except
    /// for `Remove`, which deletes the row in any state.
    pub fn finalize(
        conn: &Connection,
        pkgbase: &str,
        tasklist: i64,
        outcome: Finalize,
    ) -> Result<bool, QueueError> {
        let tx = immediate(conn)?;
        let changed = Self::finalize_in(&tx, pkgbase, tasklist, outcome)?;
        tx.commit()?;
        Ok(changed)
    }

    /// Finalize inside a caller-owned transaction
    ///
    /// Lets the build driver write the ledger, the attempt log and the task
    /// state atomically.
    pub fn finalize_in(
        conn: &Connection,
        pkgbase: &str,
        tasklist: i64,
        outcome: Finalize,
    ) -> Result<bool, QueueError> {
        let info = match outcome {
            Finalize::Remove => {
                let removed = if is_command(pkgbase) {
                    conn.execute(
                        "DELETE FROM tasks WHERE pkgbase = ?1 AND tasklist = ?2 AND info = 'command'",
                        rusqlite::params![pkgbase, tasklist],
                    )?
                } else {
                    conn.execute(
                        "DELETE FROM tasks WHERE pkgbase = ?1 AND tasklist = ?2",
                        rusqlite::params![pkgbase, tasklist],
                    )?
                };
                return Ok(removed > 0);
            }
            Finalize::Done | Finalize::Failed(_) => match Self::ledger_flags(conn, pkgbase)? {
                Some(mask) if flags::is_failed(mask) => TaskInfo::Failed(flags::error_code(mask)),
                Some(_) => TaskInfo::Done,
                None => match outcome {
                    Finalize::Failed(code) => TaskInfo::Failed(code),
                    _ => TaskInfo::Done,
                },
            },
            Finalize::NoLog => TaskInfo::NoLog,
            Finalize::Skipped => TaskInfo::Skipped,
        };

        let since = chrono::Utc::now().timestamp() - LOG_LINK_WINDOW_SECS;
        let logid: Option<i64> = conn
            .query_row(
                "SELECT id FROM logs WHERE pkgbase = ?1 AND build_time >= ?2
                 ORDER BY build_time DESC, id DESC LIMIT 1",
                rusqlite::params![pkgbase, since],
                |row| row.get(0),
            )
            .optional()?;

        let changed = conn.execute(
            "UPDATE tasks SET info = ?1, logid = ?2
             WHERE pkgbase = ?3 AND tasklist = ?4 AND info = 'building'",
            rusqlite::params![info.to_column(), logid, pkgbase, tasklist],
        )?;
        if changed > 0 {
            log::info!("list {}: {} -> {}", tasklist, pkgbase, info.to_column().unwrap_or_default());
        } else {
            log::debug!("list {}: no building row for {}", tasklist, pkgbase);
        }
        Ok(changed > 0)
    }

    /// All live rows of a tasklist in dequeue order
    pub fn list(conn: &Connection, tasklist: i64) -> Result<Vec<Task>, QueueError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE tasklist = ?1 ORDER BY taskno",
            TASK_COLUMNS
        ))?;
        let rows = stmt.query_map([tasklist], Self::row_to_task)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Enqueue batch `offset` steps back from the most recent one
    pub fn history(conn: &Connection, offset: u32) -> Result<Option<HistoryBatch>, QueueError> {
        let taskid: Option<i64> = conn
            .query_row(
                "SELECT DISTINCT taskid FROM tasks ORDER BY taskid DESC LIMIT 1 OFFSET ?1",
                [offset],
                |row| row.get(0),
            )
            .optional()?;
        let Some(taskid) = taskid else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE taskid = ?1 ORDER BY taskno, id",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map([taskid], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(HistoryBatch { taskid, tasks }))
    }

    /// Cancel packages from a tasklist, in any state
    ///
    /// Returns the names that were actually removed.
    pub fn remove(
        conn: &Connection,
        pkgbases: &[String],
        tasklist: i64,
    ) -> Result<Vec<String>, QueueError> {
        let tx = immediate(conn)?;
        let mut removed = Vec::new();
        for pkgbase in pkgbases {
            let n = tx.execute(
                "DELETE FROM tasks WHERE pkgbase = ?1 AND tasklist = ?2",
                rusqlite::params![pkgbase, tasklist],
            )?;
            if n > 0 {
                removed.push(pkgbase.clone());
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Move a stuck `building` row back to waiting
    pub fn reset(conn: &Connection, pkgbase: &str, tasklist: i64) -> Result<bool, QueueError> {
        let tx = immediate(conn)?;
        let changed = tx.execute(
            "UPDATE tasks SET info = NULL WHERE pkgbase = ?1 AND tasklist = ?2 AND info = 'building'",
            rusqlite::params![pkgbase, tasklist],
        )?;
        tx.commit()?;
        if changed > 0 {
            log::info!("list {}: reset {} to waiting", tasklist, pkgbase);
        }
        Ok(changed > 0)
    }

    /// Delete retired rows, but only once no live rows remain anywhere
    ///
    /// Returns `None` when live rows block the purge.
    pub fn purge_retired(conn: &Connection) -> Result<Option<usize>, QueueError> {
        let tx = immediate(conn)?;
        if Self::any_live(&tx)? {
            return Ok(None);
        }
        let purged = tx.execute("DELETE FROM tasks WHERE tasklist = 0", [])?;
        tx.commit()?;
        Ok(Some(purged))
    }

    /// Tasklists that still hold live rows
    pub fn live_tasklists(conn: &Connection) -> Result<Vec<TasklistSummary>, QueueError> {
        let mut stmt = conn.prepare(
            "SELECT tasklist,
                    SUM(CASE WHEN info IS NULL THEN 1 ELSE 0 END),
                    SUM(CASE WHEN info IN ('building', 'command') THEN 1 ELSE 0 END),
                    COUNT(*)
             FROM tasks WHERE tasklist != 0
             GROUP BY tasklist ORDER BY tasklist",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TasklistSummary {
                tasklist: row.get(0)?,
                waiting: row.get(1)?,
                building: row.get(2)?,
                total: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The live row of a package, if any
    pub fn find_live(conn: &Connection, pkgbase: &str) -> Result<Option<Task>, QueueError> {
        let task = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tasks WHERE pkgbase = ?1 AND tasklist != 0 ORDER BY id LIMIT 1",
                    TASK_COLUMNS
                ),
                [pkgbase],
                Self::row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn is_live(conn: &Connection, pkgbase: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE pkgbase = ?1 AND tasklist != 0)",
            [pkgbase],
            |row| row.get(0),
        )
    }

    fn any_live(conn: &Connection) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE tasklist != 0)",
            [],
            |row| row.get(0),
        )
    }

    /// Live rows that a claim on `tasklist` would not retire
    fn live_beyond_finished(conn: &Connection, tasklist: i64) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM tasks
                WHERE tasklist != 0
                  AND NOT (tasklist = ?1 AND info IS NOT NULL AND info NOT IN ('building', 'command'))
            )",
            [tasklist],
            |row| row.get(0),
        )
    }

    fn append_point(conn: &Connection, tasklist: i64) -> rusqlite::Result<i64> {
        conn.query_row(
            "SELECT COALESCE(MAX(taskno), 0) + 1 FROM tasks WHERE tasklist = ?1",
            [tasklist],
            |row| row.get(0),
        )
    }

    fn first_waiting_taskno(conn: &Connection, tasklist: i64) -> rusqlite::Result<Option<i64>> {
        conn.query_row(
            "SELECT MIN(taskno) FROM tasks WHERE tasklist = ?1 AND info IS NULL",
            [tasklist],
            |row| row.get(0),
        )
    }

    /// Shift live rows at or after `point` down by `count`
    fn shift_from(conn: &Connection, tasklist: i64, point: i64, count: i64) -> rusqlite::Result<()> {
        // Go through negative tasknos so the unique index never sees a collision
        conn.execute(
            "UPDATE tasks SET taskno = -(taskno + ?3) WHERE tasklist = ?1 AND taskno >= ?2",
            rusqlite::params![tasklist, point, count],
        )?;
        conn.execute(
            "UPDATE tasks SET taskno = -taskno WHERE tasklist = ?1 AND taskno < 0",
            [tasklist],
        )?;
        Ok(())
    }

    fn next_waiting(conn: &Connection, tasklist: i64) -> rusqlite::Result<Option<Task>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM tasks WHERE tasklist = ?1 AND info IS NULL ORDER BY taskno LIMIT 1",
                TASK_COLUMNS
            ),
            [tasklist],
            Self::row_to_task,
        )
        .optional()
    }

    fn ledger_flags(conn: &Connection, pkgbase: &str) -> rusqlite::Result<Option<u32>> {
        conn.query_row(
            "SELECT flags FROM packages WHERE base = ?1",
            [pkgbase],
            |row| row.get(0),
        )
        .optional()
    }

    fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
        let repo: i64 = row.get(5)?;
        let info: Option<String> = row.get(6)?;
        Ok(Task {
            id: row.get(0)?,
            taskno: row.get(1)?,
            pkgbase: row.get(2)?,
            taskid: row.get(3)?,
            tasklist: row.get(4)?,
            repo: Channel::from_i64(repo).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(5, "repo".to_string(), rusqlite::types::Type::Integer)
            })?,
            info: TaskInfo::from_column(info.as_deref()).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(6, "info".to_string(), rusqlite::types::Type::Text)
            })?,
            logid: row.get(7)?,
            created_ts: row.get(8)?,
        })
    }
}

pub(crate) fn is_valid_pkgbase(pkgbase: &str) -> bool {
    let name = pkgbase.strip_prefix('%').unwrap_or(pkgbase);
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}
