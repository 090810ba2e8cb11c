//! Configuration module for sqlworker.
//!
//! Handles the TOML config file, environment variables, and durations.

mod settings;

pub use settings::{expand_env_vars, parse_duration, Settings, SettingsError, WorkerSettings};
