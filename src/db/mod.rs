pub mod connection;
pub mod migrations;

pub use connection::DbConnection;
pub use migrations::MigrationManager;

use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Begin a `BEGIN IMMEDIATE` transaction on a shared connection
///
/// The write lock is taken up front, so a read followed by a write inside the
/// transaction cannot interleave with another worker's writer. Dropping the
/// transaction without committing rolls it back.
pub fn immediate(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}
