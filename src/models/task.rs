use serde::{Deserialize, Serialize};
use crate::models::failure::describe_code;

/// Leading character that turns a task row into a command for the worker
pub const COMMAND_PREFIX: char = '%';

/// Whether a pkgbase names a command pseudo-task such as `%quit`
pub fn is_command(pkgbase: &str) -> bool {
    pkgbase.starts_with(COMMAND_PREFIX)
}

/// Release channel a task is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Testing,
    Staging,
}

impl Channel {
    pub fn as_i64(&self) -> i64 {
        match self {
            Channel::Stable => 0,
            Channel::Testing => 1,
            Channel::Staging => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Channel::Stable),
            1 => Some(Channel::Testing),
            2 => Some(Channel::Staging),
            _ => None,
        }
    }

    /// Suffix appended to the repository name, e.g. `core-testing`
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::Stable => "",
            Channel::Testing => "-testing",
            Channel::Staging => "-staging",
        }
    }

    /// Ledger bit recording that the last build targeted this channel
    pub fn flag(&self) -> u32 {
        match self {
            Channel::Stable => 0,
            Channel::Testing => crate::models::flags::TESTING,
            Channel::Staging => crate::models::flags::STAGING,
        }
    }
}

/// Task state as stored in the `info` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskInfo {
    Waiting,
    Building,
    Done,
    Failed(u8),
    NoLog,
    Skipped,
    Command,
}

impl TaskInfo {
    pub fn from_column(value: Option<&str>) -> Option<Self> {
        let Some(value) = value else {
            return Some(TaskInfo::Waiting);
        };
        match value {
            "building" => Some(TaskInfo::Building),
            "done" => Some(TaskInfo::Done),
            "nolog" => Some(TaskInfo::NoLog),
            "skipped" => Some(TaskInfo::Skipped),
            "command" => Some(TaskInfo::Command),
            other => other
                .strip_prefix("failed:")
                .and_then(|code| code.parse().ok())
                .map(TaskInfo::Failed),
        }
    }

    pub fn to_column(&self) -> Option<String> {
        match self {
            TaskInfo::Waiting => None,
            TaskInfo::Building => Some("building".to_string()),
            TaskInfo::Done => Some("done".to_string()),
            TaskInfo::Failed(code) => Some(format!("failed:{}", code)),
            TaskInfo::NoLog => Some("nolog".to_string()),
            TaskInfo::Skipped => Some("skipped".to_string()),
            TaskInfo::Command => Some("command".to_string()),
        }
    }

    /// Human-readable state for listings
    pub fn describe(&self) -> String {
        match self {
            TaskInfo::Waiting => String::new(),
            TaskInfo::Building => "Building".to_string(),
            TaskInfo::Done => "Done".to_string(),
            TaskInfo::Failed(code) => describe_code(*code),
            TaskInfo::NoLog => "No build log".to_string(),
            TaskInfo::Skipped => "Skipped".to_string(),
            TaskInfo::Command => "Command".to_string(),
        }
    }
}

impl Serialize for TaskInfo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_column() {
            Some(value) => serializer.serialize_str(&value),
            None => serializer.serialize_none(),
        }
    }
}

/// Task row
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub taskno: i64,
    pub pkgbase: String,
    pub taskid: i64,
    pub tasklist: i64,
    pub repo: Channel,
    pub info: TaskInfo,
    pub logid: Option<i64>,
    pub created_ts: i64,
}

impl Task {
    pub fn is_command(&self) -> bool {
        is_command(&self.pkgbase)
    }

    pub fn status_text(&self) -> String {
        self.info.describe()
    }
}

/// Serialized with a `status` field next to the raw `info` column
impl Serialize for Task {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let status = match self.info {
            TaskInfo::Waiting => "Waiting".to_string(),
            _ => self.status_text(),
        };
        let mut state = serializer.serialize_struct("Task", 10)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("taskno", &self.taskno)?;
        state.serialize_field("pkgbase", &self.pkgbase)?;
        state.serialize_field("taskid", &self.taskid)?;
        state.serialize_field("tasklist", &self.tasklist)?;
        state.serialize_field("repo", &self.repo)?;
        state.serialize_field("info", &self.info)?;
        state.serialize_field("status", &status)?;
        state.serialize_field("logid", &self.logid)?;
        state.serialize_field("created_ts", &self.created_ts)?;
        state.end()
    }
}

/// Where an enqueued batch lands in its tasklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// After the last live task
    Append,
    /// Before the first waiting task
    Top,
    /// At the given taskno, shifting later tasks down
    At(i64),
}
