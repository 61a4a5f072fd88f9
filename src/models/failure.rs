use serde::Serialize;

/// Why a build failed, as classified from its log
///
/// The numeric code is what the ledger stores in bits 16..24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Patch,
    BeforeBuild,
    Download,
    Validity,
    Pgp,
    Dependencies,
    Prepare,
    Build,
    Check,
    Package,
    BuildType,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 11] = [
        Self::Patch,
        Self::BeforeBuild,
        Self::Download,
        Self::Validity,
        Self::Pgp,
        Self::Dependencies,
        Self::Prepare,
        Self::Build,
        Self::Check,
        Self::Package,
        Self::BuildType,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Self::Patch => 1,
            Self::BeforeBuild => 2,
            Self::Download => 3,
            Self::Validity => 4,
            Self::Pgp => 5,
            Self::Dependencies => 6,
            Self::Prepare => 7,
            Self::Build => 8,
            Self::Check => 9,
            Self::Package => 10,
            Self::BuildType => 11,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Patch => "Failed to apply patch",
            Self::BeforeBuild => "Failed before build",
            Self::Download => "Failed to download source",
            Self::Validity => "Failed to pass the validity check",
            Self::Pgp => "Failed to pass PGP check",
            Self::Dependencies => "Could not resolve all dependencies",
            Self::Prepare => "Failed in prepare",
            Self::Build => "Failed in build",
            Self::Check => "Failed in check",
            Self::Package => "Failed in package",
            Self::BuildType => "Failed to guess build type",
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download | Self::Pgp)
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Category text for a stored code, tolerating codes outside the table
pub fn describe_code(code: u8) -> String {
    match FailureCategory::from_code(code) {
        Some(category) => category.description().to_string(),
        None => format!("Unknown failure {}", code),
    }
}
