use serde::Serialize;

/// Immutable record of one finalized build attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptLog {
    pub id: i64,
    pub pkgbase: String,
    pub builder: String,
    pub build_result: u32,
    pub build_time: i64,
}

/// Registered build machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Builder {
    pub id: i64,
    pub name: String,
    pub scale: f64,
}

/// Builder id used for attempts from unregistered machines
pub const UNKNOWN_BUILDER_ID: i64 = 1;
