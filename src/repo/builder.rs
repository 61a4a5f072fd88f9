use rusqlite::{Connection, OptionalExtension};
use crate::error::LedgerError;
use crate::models::Builder;

/// Registered build machines and their timecost scale
pub struct BuilderRepo;

impl BuilderRepo {
    /// Register a builder, or update the scale of an existing one
    pub fn add(conn: &Connection, name: &str, scale: f64) -> Result<Builder, LedgerError> {
        conn.execute(
            "INSERT INTO builders (name, scale) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET scale = excluded.scale",
            rusqlite::params![name, scale],
        )?;
        let builder = conn.query_row(
            "SELECT id, name, scale FROM builders WHERE name = ?1",
            [name],
            |row| {
                Ok(Builder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    scale: row.get(2)?,
                })
            },
        )?;
        log::info!("builder {} registered with scale {}", builder.name, builder.scale);
        Ok(builder)
    }

    /// Timecost multiplier for a builder; 1.0 when unregistered
    pub fn scale(conn: &Connection, name: &str) -> Result<f64, LedgerError> {
        let scale = conn
            .query_row("SELECT scale FROM builders WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(scale.unwrap_or(1.0))
    }

    pub fn list(conn: &Connection) -> Result<Vec<Builder>, LedgerError> {
        let mut stmt = conn.prepare("SELECT id, name, scale FROM builders ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Builder {
                id: row.get(0)?,
                name: row.get(1)?,
                scale: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;

    #[test]
    fn test_add_and_rescale() {
        let conn = DbConnection::connect_in_memory().unwrap();
        let first = BuilderRepo::add(&conn, "loong-01", 1.2).unwrap();
        let again = BuilderRepo::add(&conn, "loong-01", 0.8).unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(BuilderRepo::scale(&conn, "loong-01").unwrap(), 0.8);
        assert_eq!(BuilderRepo::scale(&conn, "elsewhere").unwrap(), 1.0);
        assert_eq!(BuilderRepo::list(&conn).unwrap().len(), 2);
    }
}
