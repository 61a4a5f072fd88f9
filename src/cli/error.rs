// Error handling utilities for consistent error messages and exit codes

use std::process;

/// Exit with a user error (exit code 1)
/// User errors are for invalid input, unknown packages, queue conflicts, etc.
pub fn user_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Exit with an internal error (exit code 2)
/// Internal errors are database or I/O failures the user cannot fix by
/// changing the command line.
pub fn internal_error(message: &str) -> ! {
    eprintln!("Internal error: {}", message);
    process::exit(2);
}

/// Whether an error chain bottoms out in the database or the filesystem
pub fn is_internal(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.is::<rusqlite::Error>() || cause.is::<std::io::Error>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;

    #[test]
    fn test_storage_errors_are_internal() {
        let err = anyhow::Error::from(QueueError::Storage(rusqlite::Error::InvalidQuery));
        assert!(is_internal(&err));

        let err = anyhow::Error::from(QueueError::Conflict(vec!["zlib".to_string()]));
        assert!(!is_internal(&err));

        let err = anyhow::Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"))
            .context("Failed to open database");
        assert!(is_internal(&err));
    }
}
