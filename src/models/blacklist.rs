use serde::Serialize;

/// A package that must not be queued for the port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlacklistEntry {
    pub pkgbase: String,
    pub reason: Option<String>,
    pub added_ts: i64,
}
