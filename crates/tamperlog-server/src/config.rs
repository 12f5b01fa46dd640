//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use tamperlog_broadcast::DEFAULT_SUBSCRIBER_CAPACITY;
use tamperlog_db::DbRuntimeSettings;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Live notification settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a connection waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long a caller waits for a free pooled connection, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "tamperlog_ingest=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Subscriber fan-out configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Undelivered entries buffered per subscriber before newer ones are dropped.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "tamperlog.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_connection_timeout_ms() -> u64 {
    DbRuntimeSettings::default().connection_timeout_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Pool and connection settings for [`tamperlog_db::open_pool`].
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            connection_timeout_ms: self.connection_timeout_ms,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `TAMPERLOG_HOST` overrides `server.host`
/// - `TAMPERLOG_PORT` overrides `server.port`
/// - `TAMPERLOG_DB_PATH` overrides `database.path`
/// - `TAMPERLOG_LOG_LEVEL` overrides `logging.level`
/// - `TAMPERLOG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `TAMPERLOG_SUBSCRIBER_CAPACITY` overrides `broadcast.subscriber_capacity`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `TAMPERLOG_*` overrides read through `lookup`. Unparseable values
/// are ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("TAMPERLOG_HOST") {
        match host.parse() {
            Ok(parsed) => config.server.host = parsed,
            Err(_) => tracing::warn!(value = %host, "ignoring invalid TAMPERLOG_HOST"),
        }
    }
    if let Some(port) = lookup("TAMPERLOG_PORT") {
        match port.parse() {
            Ok(parsed) => config.server.port = parsed,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid TAMPERLOG_PORT"),
        }
    }
    if let Some(db_path) = lookup("TAMPERLOG_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("TAMPERLOG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("TAMPERLOG_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(capacity) = lookup("TAMPERLOG_SUBSCRIBER_CAPACITY") {
        match capacity.parse() {
            Ok(parsed) => config.broadcast.subscriber_capacity = parsed,
            Err(_) => {
                tracing::warn!(value = %capacity, "ignoring invalid TAMPERLOG_SUBSCRIBER_CAPACITY")
            }
        }
    }
}
