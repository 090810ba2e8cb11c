//! TOML-based configuration for sqlworker.
//!
//! Supports a config file (sqlworker.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! file = "${DATA_DIR}/app.db"
//! timeout = "10s"          # or "none" to wait forever
//! thread_name = "sqlworker-executor"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::WorkerOptions;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker configuration.
    pub worker: WorkerSettings,
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Database file to open (supports ${ENV_VAR} expansion).
    pub file: Option<String>,

    /// Per-call timeout (e.g., "10s", "500ms", "none").
    pub timeout: String,

    /// Name given to the executor thread.
    pub thread_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            file: None,
            timeout: "10s".to_string(),
            thread_name: "sqlworker-executor".to_string(),
        }
    }
}

impl WorkerSettings {
    /// Get the database file with environment variables expanded.
    pub fn resolved_file(&self) -> Result<Option<String>, SettingsError> {
        self.file.as_deref().map(expand_env_vars).transpose()
    }

    /// Build the options a connection is created with.
    pub fn options(&self) -> Result<WorkerOptions, SettingsError> {
        Ok(WorkerOptions {
            timeout: parse_duration(&self.timeout)?,
            thread_name: self.thread_name.clone(),
        })
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SQLWORKER_CONFIG`
    /// 2. `./sqlworker.toml`
    /// 3. `~/.config/sqlworker/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SQLWORKER_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("sqlworker.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sqlworker").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Parse a duration such as `"250ms"`, `"10s"`, `"2m"` or `"1h"`.
///
/// `"none"` and `"off"` mean no timeout. A bare number is taken as milliseconds.
pub fn parse_duration(s: &str) -> Result<Option<Duration>, SettingsError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("off") {
        return Ok(None);
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;

    let invalid = || SettingsError::InvalidDuration(s.to_string());
    let duration = match unit.trim() {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(Some(duration))
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept as-is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').unwrap_or(braced.len());
            let consumed = (end + 2).min(after.len());
            (&braced[..end], consumed)
        } else {
            let end = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if consumed == 0 {
            result.push('$');
        } else {
            let value =
                env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;
            result.push_str(&value);
        }
        rest = &after[consumed..];
    }

    result.push_str(rest);
    Ok(result)
}
