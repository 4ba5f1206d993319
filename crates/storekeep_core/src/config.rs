//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe database, session and logging settings in one serde model.
//! - Reject invalid values before anything is opened.
//!
//! # Invariants
//! - Every field has a default, so `{}` is a valid configuration.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_SHARE_LINK_PREFIX: &str = "/shared/";

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid configuration document: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite file; `None` opens a private in-memory database.
    pub db_path: Option<PathBuf>,
    /// Seconds of inactivity before a session is terminated and flushed.
    pub idle_timeout_secs: u64,
    /// Path prefix for share links; the token is appended.
    pub share_link_prefix: String,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            share_link_prefix: DEFAULT_SHARE_LINK_PREFIX.to_string(),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "idle_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if !self.share_link_prefix.starts_with('/') || !self.share_link_prefix.ends_with('/') {
            return Err(ConfigError::Invalid {
                field: "share_link_prefix",
                message: format!(
                    "must start and end with `/`, got `{}`",
                    self.share_link_prefix
                ),
            });
        }
        if let Some(dir) = self.log_dir.as_ref() {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "log_dir",
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
