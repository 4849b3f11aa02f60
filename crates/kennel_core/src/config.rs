//! Store configuration.
//!
//! # Responsibility
//! - Describe where the database lives, how long to wait on locks, and
//!   where logs go.
//! - Load that description from JSON or from `KENNEL_*` environment
//!   variables.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object or an empty
//!   environment yields an in-memory store with a 5 second busy timeout.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "KENNEL_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "KENNEL_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "KENNEL_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "KENNEL_LOG_DIR";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseLocation {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rotated log files.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseLocation,
    pub busy_timeout_ms: u64,
    pub logging: Option<LoggingConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            logging: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid store config JSON: {err}"),
            Self::InvalidValue { key, message } => write!(f, "invalid {key}: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseLocation::File { path: path.into() },
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads `KENNEL_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from `(name, value)` pairs; unknown names are ignored.
    ///
    /// # Errors
    /// - `InvalidValue` for a non-numeric busy timeout, or a log level
    ///   without a log directory.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        let mut level = None;
        let mut dir = None;

        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                ENV_DB_PATH => {
                    let trimmed = value.trim();
                    config.database = if trimmed.is_empty() || trimmed == MEMORY_PATH {
                        DatabaseLocation::Memory
                    } else {
                        DatabaseLocation::File {
                            path: PathBuf::from(trimmed),
                        }
                    };
                }
                ENV_BUSY_TIMEOUT_MS => {
                    config.busy_timeout_ms =
                        value
                            .trim()
                            .parse()
                            .map_err(|err| ConfigError::InvalidValue {
                                key: ENV_BUSY_TIMEOUT_MS,
                                message: format!("`{value}` is not a millisecond count: {err}"),
                            })?;
                }
                ENV_LOG_LEVEL => level = Some(value),
                ENV_LOG_DIR => dir = Some(PathBuf::from(value.trim())),
                _ => {}
            }
        }

        config.logging = match (level, dir) {
            (level, Some(dir)) => Some(LoggingConfig {
                level: level.unwrap_or_else(|| crate::logging::default_log_level().to_string()),
                dir,
            }),
            (Some(_), None) => {
                return Err(ConfigError::InvalidValue {
                    key: ENV_LOG_LEVEL,
                    message: format!("requires {ENV_LOG_DIR}"),
                })
            }
            (None, None) => None,
        };
        Ok(config)
    }
}
