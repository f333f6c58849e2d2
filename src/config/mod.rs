//! Configuration module for dashq.
//!
//! Handles query limits, worker connection, logging and extra registry tables.

mod settings;

pub use settings::{
    expand_env_vars, LoggingSettings, QuerySettings, Settings, SettingsError, TableSettings,
    WorkerSettings, CONFIG_ENV_VAR,
};
