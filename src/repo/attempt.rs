use rusqlite::{Connection, OptionalExtension};
use crate::error::LedgerError;
use crate::models::{AttemptLog, UNKNOWN_BUILDER_ID};

/// Append-only record of finalized builds
pub struct AttemptRepo;

impl AttemptRepo {
    /// Append an attempt row and return its id
    ///
    /// Unregistered builder names are attributed to the `unknown` builder.
    pub fn record_attempt(
        conn: &Connection,
        pkgbase: &str,
        builder: &str,
        build_result: u32,
    ) -> Result<i64, LedgerError> {
        let builder_id: i64 = conn
            .query_row("SELECT id FROM builders WHERE name = ?1", [builder], |row| row.get(0))
            .optional()?
            .unwrap_or(UNKNOWN_BUILDER_ID);
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO logs (pkgbase, builder, build_result, build_time) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![pkgbase, builder_id, build_result, now],
        )?;
        let id = conn.last_insert_rowid();
        log::debug!("attempt log {} for {} (builder {}, result {:#x})", id, pkgbase, builder_id, build_result);
        Ok(id)
    }

    /// Most recent attempts for a package, newest first
    pub fn recent(conn: &Connection, pkgbase: &str, limit: u32) -> Result<Vec<AttemptLog>, LedgerError> {
        let mut stmt = conn.prepare(
            "SELECT l.id, l.pkgbase, b.name, l.build_result, l.build_time
             FROM logs l JOIN builders b ON b.id = l.builder
             WHERE l.pkgbase = ?1
             ORDER BY l.build_time DESC, l.id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pkgbase, limit], |row| {
            Ok(AttemptLog {
                id: row.get(0)?,
                pkgbase: row.get(1)?,
                builder: row.get(2)?,
                build_result: row.get(3)?,
                build_time: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::repo::BuilderRepo;

    #[test]
    fn test_unknown_builder_maps_to_one() {
        let conn = DbConnection::connect_in_memory().unwrap();
        AttemptRepo::record_attempt(&conn, "zlib", "nobody", 16).unwrap();

        let logs = AttemptRepo::recent(&conn, "zlib", 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].builder, "unknown");
        assert_eq!(logs[0].build_result, 16);
    }

    #[test]
    fn test_registered_builder_is_used() {
        let conn = DbConnection::connect_in_memory().unwrap();
        BuilderRepo::add(&conn, "loong-01", 1.5).unwrap();
        let first = AttemptRepo::record_attempt(&conn, "zlib", "loong-01", 0).unwrap();
        let second = AttemptRepo::record_attempt(&conn, "zlib", "loong-01", 16).unwrap();
        assert!(second > first);

        let logs = AttemptRepo::recent(&conn, "zlib", 1).unwrap();
        assert_eq!(logs[0].id, second);
        assert_eq!(logs[0].builder, "loong-01");
    }
}
