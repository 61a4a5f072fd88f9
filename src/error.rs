use thiserror::Error;

/// Errors raised by the task queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("already queued: {}", .0.join(", "))]
    Conflict(Vec<String>),
    #[error("blacklisted: {}", .0.join(", "))]
    Blacklisted(Vec<String>),
    #[error("tasklist must be positive, got {0}")]
    InvalidTasklist(i64),
    #[error("invalid package name '{0}'")]
    InvalidPkgbase(String),
    #[error("no package names given")]
    EmptyBatch,
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Errors raised by the package ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("package '{0}' not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Errors that stop the build driver
///
/// Build failures themselves are outcomes, not errors; these are the cases
/// where the queue or the ledger could not be updated, or the build tool
/// could not be started at all.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("failed to run the build tool for {pkgname}: {source}")]
    Spawn {
        pkgname: String,
        #[source]
        source: std::io::Error,
    },
}
