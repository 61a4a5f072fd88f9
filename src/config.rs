use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use crate::utils::parse_duration;

/// Errors raised while locating or parsing the rc file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHome,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value '{value}' for '{key}' on line {line}")]
    InvalidValue {
        key: String,
        value: String,
        line: usize,
    },
}

/// Settings read from `~/.loongshot/rc`
///
/// The file holds `key=value` lines; blank lines and lines starting with `#`
/// are ignored. Relative paths are resolved against the directory holding
/// the rc file. Every field is optional so that command-line flags can fill
/// in whatever the file leaves out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub data_location: Option<PathBuf>,
    pub builder_name: Option<String>,
    pub builder_script: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub max_retries: Option<u32>,
    pub backoff: Option<Duration>,
    pub systemd_scope: bool,
    pub stop_grace: Option<Duration>,
}

impl Config {
    /// Directory holding the rc file and the default database
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".loongshot"))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("rc"))
    }

    /// Load the rc file, falling back to defaults when it does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            log::debug!("no rc file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
    }

    /// Parse rc content; `base_dir` anchors relative paths
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!("ignoring malformed rc line {}: {}", idx + 1, line);
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                line: idx + 1,
            };

            match key {
                "data.location" => config.data_location = Some(resolve(base_dir, value)),
                "builder.name" => config.builder_name = Some(value.to_string()),
                "builder.script" => config.builder_script = Some(resolve(base_dir, value)),
                "build.log_dir" => config.log_dir = Some(resolve(base_dir, value)),
                "build.max_retries" => {
                    config.max_retries = Some(value.parse().map_err(|_| invalid())?);
                }
                "build.backoff" => {
                    config.backoff = Some(parse_duration(value).map_err(|_| invalid())?);
                }
                "build.systemd_scope" => {
                    config.systemd_scope = parse_bool(value).ok_or_else(invalid)?;
                }
                "build.stop_grace" => {
                    config.stop_grace = Some(parse_duration(value).map_err(|_| invalid())?);
                }
                other => log::warn!("ignoring unknown rc key '{}'", other),
            }
        }

        Ok(config)
    }
}

fn resolve(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
