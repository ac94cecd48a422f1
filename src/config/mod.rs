//! Configuration management.
//!
//! Values come from, in increasing precedence:
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. Environment variables, including a `.env` file in the working directory

use crate::observability::LogFormat;
use crate::observability::metrics::{DEFAULT_METRICS_PORT, MetricsConfig};
use crate::storage::ttl::DEFAULT_TTL_INTERVAL;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default cap on records returned by a list endpoint.
pub const DEFAULT_MAX_RETURN_ARRAY_SIZE: usize = 100;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default per-request store deadline.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Which store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Embedded `SQLite`, file-backed or in-memory.
    #[default]
    Sqlite,
    /// In-process maps; nothing survives a restart.
    Memory,
}

impl BackendKind {
    /// Returns the backend as a config string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            other => Err(Error::Config(format!(
                "unknown store backend '{other}' (expected 'sqlite' or 'memory')"
            ))),
        }
    }
}

/// Runtime configuration for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// `SQLite` file used when `use_memory_db` is false.
    pub database_path: PathBuf,
    /// Use an ephemeral in-memory `SQLite` database.
    pub use_memory_db: bool,
    /// Store implementation.
    pub backend: BackendKind,
    /// Cap passed to the result consumer by list endpoints.
    pub max_return_array_size: usize,
    /// Bind address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Directory uploaded images are written to.
    pub image_directory: PathBuf,
    /// Deadline applied to each request's store calls.
    pub operation_timeout: Duration,
    /// Interval between time-to-live passes.
    pub ttl_monitor_interval: Duration,
    /// Log output format.
    pub log_format: LogFormat,
    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,
    /// Port of the Prometheus scrape endpoint.
    pub metrics_port: u16,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// `SQLite` file path.
    pub database_path: Option<String>,
    /// Ephemeral database.
    pub use_memory_db: Option<bool>,
    /// `sqlite` or `memory`.
    pub store_backend: Option<String>,
    /// List endpoint cap.
    pub max_return_array_size: Option<usize>,
    /// Bind address.
    pub host: Option<String>,
    /// HTTP port.
    pub port: Option<u16>,
    /// Upload directory.
    pub image_directory: Option<String>,
    /// Per-request deadline in milliseconds.
    pub operation_timeout_ms: Option<u64>,
    /// Time-to-live pass interval in seconds.
    pub ttl_monitor_interval_secs: Option<u64>,
    /// `pretty` or `json`.
    pub log_format: Option<String>,
    /// Serve Prometheus metrics.
    pub metrics_enabled: Option<bool>,
    /// Prometheus scrape port.
    pub metrics_port: Option<u16>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            use_memory_db: true,
            backend: BackendKind::default(),
            max_return_array_size: DEFAULT_MAX_RETURN_ARRAY_SIZE,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            image_directory: PathBuf::from("images"),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            ttl_monitor_interval: DEFAULT_TTL_INTERVAL,
            log_format: LogFormat::default(),
            metrics_enabled: true,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ServiceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the full configuration: defaults, then `path` if given, then the
    /// process environment (after reading `.env` if present).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed, or any
    /// value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!(path = %env_file.display(), "Loaded .env file");
        }
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Loads configuration from a TOML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("cannot parse config file {}: {e}", path.display()))
        })?;
        Self::from_config_file(file)
    }

    /// Converts a `ConfigFile` to `ServiceConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file.database_path {
            config.database_path = PathBuf::from(path);
        }
        if let Some(v) = file.use_memory_db {
            config.use_memory_db = v;
        }
        if let Some(backend) = file.store_backend {
            config.backend = backend.parse()?;
        }
        if let Some(v) = file.max_return_array_size {
            config.max_return_array_size = v;
        }
        if let Some(host) = file.host {
            config.host = host;
        }
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(dir) = file.image_directory {
            config.image_directory = PathBuf::from(dir);
        }
        if let Some(ms) = file.operation_timeout_ms {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = file.ttl_monitor_interval_secs {
            config.ttl_monitor_interval = Duration::from_secs(secs);
        }
        if let Some(format) = file.log_format {
            config.log_format = format.parse()?;
        }
        if let Some(v) = file.metrics_enabled {
            config.metrics_enabled = v;
        }
        if let Some(port) = file.metrics_port {
            config.metrics_port = port;
        }

        config.validate()?;
        Ok(config)
    }

    /// Overrides values from environment variables read through `lookup`.
    ///
    /// Reads:
    /// - `DATABASE_PATH`, `USE_MEMORY_DB`, `STORE_BACKEND`
    /// - `MAX_RETURN_ARRAY_SIZE`
    /// - `HOST`, `PORT`, `IMAGE_DIRECTORY`
    /// - `OPERATION_TIMEOUT_MS`, `TTL_MONITOR_INTERVAL_SECS`
    /// - `LOG_FORMAT`
    /// - `METRICS_ENABLED`, `METRICS_PORT`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first variable that does not parse.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(v) = lookup("USE_MEMORY_DB") {
            self.use_memory_db = parse_bool("USE_MEMORY_DB", &v)?;
        }
        if let Some(v) = lookup("STORE_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("MAX_RETURN_ARRAY_SIZE") {
            self.max_return_array_size = parse_number("MAX_RETURN_ARRAY_SIZE", &v)?;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_number("PORT", &v)?;
        }
        if let Some(dir) = lookup("IMAGE_DIRECTORY") {
            self.image_directory = PathBuf::from(dir);
        }
        if let Some(v) = lookup("OPERATION_TIMEOUT_MS") {
            self.operation_timeout = Duration::from_millis(parse_number("OPERATION_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("TTL_MONITOR_INTERVAL_SECS") {
            self.ttl_monitor_interval =
                Duration::from_secs(parse_number("TTL_MONITOR_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        if let Some(v) = lookup("METRICS_ENABLED") {
            self.metrics_enabled = parse_bool("METRICS_ENABLED", &v)?;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            self.metrics_port = parse_number("METRICS_PORT", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero result cap, timeout or interval.
    pub fn validate(&self) -> Result<()> {
        if self.max_return_array_size == 0 {
            return Err(Error::Config(
                "MAX_RETURN_ARRAY_SIZE must be a positive integer".to_string(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::Config(
                "OPERATION_TIMEOUT_MS must be a positive integer".to_string(),
            ));
        }
        if self.ttl_monitor_interval.is_zero() {
            return Err(Error::Config(
                "TTL_MONITOR_INTERVAL_SECS must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the Prometheus exporter settings.
    #[must_use]
    pub const fn metrics(&self) -> MetricsConfig {
        MetricsConfig::new(self.metrics_enabled, self.metrics_port)
    }

    /// Returns the socket address string to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the store backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the upload directory.
    #[must_use]
    pub fn with_image_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_directory = path.into();
        self
    }
}

/// `<platform data dir>/todo-list-service/todos.db`, or `todos.db` when the
/// platform has no data directory.
fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "todo-list-service").map_or_else(
        || PathBuf::from("todos.db"),
        |dirs| dirs.data_dir().join("todos.db"),
    )
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: '{other}' is not a boolean"))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: '{value}' is not a valid number")))
}
