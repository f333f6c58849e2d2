//! TOML-based configuration for dashq.
//!
//! Supports a config file (dashq.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [query]
//! max_rows = 1000
//! hard_row_cap = 10000
//! timeout_ms = 30000
//! retry_backoff_ms = 500
//! dialect = "postgres"
//!
//! [worker]
//! path = "./dashq-worker"
//! driver = "postgres"
//! connection_string = "${DATABASE_URL}"
//!
//! [logging]
//! filter = "info"
//!
//! [tables.billing_events]
//! physical_table = "analytics.billing_events"
//! tenant_column = "project_id"
//! row_key = "id"
//!
//! [[tables.billing_events.columns]]
//! name = "amount"
//! physical = "amount"
//! type = "number"
//! aggregatable = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::ExecutorOptions;
use crate::registry::{ColumnDefinition, ColumnRegistry, RegistryError, TableDefinition};
use crate::sql::Dialect;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "DASHQ_CONFIG";

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

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid table definition: {0}")]
    Registry(#[from] RegistryError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub query: QuerySettings,
    pub worker: WorkerSettings,
    pub logging: LoggingSettings,
    /// Extra registry tables, keyed by logical name.
    pub tables: BTreeMap<String, TableSettings>,
}

/// Limits and rendering options for every query.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Rows returned when the caller gives no limit, and the clamp for larger limits.
    pub max_rows: u64,
    /// Backend results larger than this fail with a resource error.
    pub hard_row_cap: usize,
    pub timeout_ms: u64,
    /// Backoff hint returned with retriable errors.
    pub retry_backoff_ms: u64,
    pub dialect: Dialect,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            hard_row_cap: 10_000,
            timeout_ms: 30_000,
            retry_backoff_ms: 500,
            dialect: Dialect::Postgres,
        }
    }
}

impl QuerySettings {
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            hard_row_cap: self.hard_row_cap,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            dialect: self.dialect,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker binary (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Extra command-line arguments for the worker.
    pub args: Vec<String>,

    /// Database driver name passed with every request.
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: vec![],
            driver: "postgres".to_string(),
            connection_string: None,
        }
    }
}

impl WorkerSettings {
    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        let raw = self.connection_string.as_deref().ok_or_else(|| {
            SettingsError::InvalidConfig("worker.connection_string is not set".into())
        })?;
        expand_env_vars(raw)
    }

    /// Get the worker binary path.
    ///
    /// Uses the configured path if set, otherwise the first existing
    /// well-known location.
    pub fn worker_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }

        ["./dashq-worker", "./worker/dashq-worker"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or_else(|| {
                SettingsError::InvalidConfig(
                    "worker binary not found; set worker.path in config".into(),
                )
            })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// A registry table declared in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableSettings {
    pub physical_table: String,
    #[serde(default)]
    pub tenant_column: Option<String>,
    #[serde(default)]
    pub row_key: Option<String>,
    pub columns: Vec<ColumnDefinition>,
}

impl TableSettings {
    fn to_definition(&self, name: &str) -> TableDefinition {
        let mut table = TableDefinition::new(name, &self.physical_table)
            .with_columns(self.columns.iter().cloned());
        if let Some(tenant) = &self.tenant_column {
            table = table.with_tenant_column(tenant);
        }
        if let Some(key) = &self.row_key {
            table = table.with_row_key(key);
        }
        table
    }
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DASHQ_CONFIG`
    /// 2. `./dashq.toml`
    /// 3. `~/.config/dashq/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dashq.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dashq").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let q = &self.query;
        if q.max_rows < 1 {
            return Err(SettingsError::InvalidConfig(
                "query.max_rows must be at least 1".into(),
            ));
        }
        if (q.hard_row_cap as u64) < q.max_rows {
            return Err(SettingsError::InvalidConfig(format!(
                "query.hard_row_cap ({}) must be at least query.max_rows ({})",
                q.hard_row_cap, q.max_rows
            )));
        }
        if q.timeout_ms < 1 {
            return Err(SettingsError::InvalidConfig(
                "query.timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The built-in registry extended with configured tables.
    pub fn registry(&self) -> Result<ColumnRegistry, SettingsError> {
        let mut registry = ColumnRegistry::builtin();
        for (name, table) in &self.tables {
            registry = registry.with_table(table.to_definition(name))?;
        }
        Ok(registry)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            let name = std::iter::from_fn(|| chars.next_if(|&ch| ch != '}')).collect();
            chars.next(); // consume '}'
            name
        } else {
            std::iter::from_fn(|| chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_')).collect()
        };

        if var_name.is_empty() {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
