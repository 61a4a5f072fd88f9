use serde::{Deserialize, Serialize};
use crate::models::flags;
use crate::models::task::Channel;

/// One row of the package ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageRecord {
    pub base: String,
    pub repo: Option<String>,
    pub flags: u32,
    pub timecost: Option<f64>,
    pub log_version: Option<String>,
    pub x86_version: Option<String>,
    pub x86_testing_version: Option<String>,
    pub x86_staging_version: Option<String>,
    pub loong_version: Option<String>,
    pub loong_testing_version: Option<String>,
    pub loong_staging_version: Option<String>,
}

impl PackageRecord {
    /// Upstream version for a channel, falling back to the more stable ones
    pub fn upstream_version(&self, channel: Channel) -> Option<&str> {
        let stable = self.x86_version.as_deref();
        let testing = self.x86_testing_version.as_deref().or(stable);
        match channel {
            Channel::Stable => stable,
            Channel::Testing => testing,
            Channel::Staging => self.x86_staging_version.as_deref().or(testing),
        }
    }

    /// Version already built for the port on a channel, with the same fallback
    pub fn built_version(&self, channel: Channel) -> Option<&str> {
        let stable = self.loong_version.as_deref();
        let testing = self.loong_testing_version.as_deref().or(stable);
        match channel {
            Channel::Stable => stable,
            Channel::Testing => testing,
            Channel::Staging => self.loong_staging_version.as_deref().or(testing),
        }
    }

    pub fn error_code(&self) -> u8 {
        flags::error_code(self.flags)
    }

    pub fn is_failed(&self) -> bool {
        flags::is_failed(self.flags)
    }
}

/// Entry of a sync file: the repository snapshot produced by the diff tool
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncEntry {
    pub base: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub x86_version: Option<String>,
    #[serde(default)]
    pub x86_testing_version: Option<String>,
    #[serde(default)]
    pub x86_staging_version: Option<String>,
    #[serde(default)]
    pub loong_version: Option<String>,
    #[serde(default)]
    pub loong_testing_version: Option<String>,
    #[serde(default)]
    pub loong_staging_version: Option<String>,
}
