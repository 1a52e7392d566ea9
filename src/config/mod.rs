/// Configuration management for gredis

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::error::ConfigError;

/// Main gredis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Router configuration
    #[serde(default)]
    pub router: RouterConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named Redis connections, registered in file order
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Connection made active after registration (first connection when unset)
    pub default_connection: Option<String>,
    /// Upper bound for one command or batch round trip in milliseconds
    pub command_timeout_ms: u64,
    /// Upper bound for dialling a backend in milliseconds
    pub connect_timeout_ms: u64,
    /// Period of `ping --watch` health checks in milliseconds
    pub health_check_interval_ms: u64,
    /// Most recent journal lines kept; older lines are discarded
    pub journal_capacity: usize,
}

/// One named Redis endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Empty password disables AUTH
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database_index: i64,
    /// Maximum in-flight requests on the multiplexed connection
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (text, compact)
    pub format: String,
}

fn default_pool_size() -> usize {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_connection: None,
            command_timeout_ms: 5000,
            connect_timeout_ms: 3000,
            health_check_interval_ms: 5000,
            journal_capacity: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            logging: LoggingConfig::default(),
            connections: vec![ConnectionConfig::new("primary", "127.0.0.1", 6379)],
        }
    }
}

impl RouterConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl ConnectionConfig {
    /// Connection without credentials on database 0
    pub fn new<N: Into<String>, H: Into<String>>(name: N, host: H, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            password: String::new(),
            database_index: 0,
            pool_size: default_pool_size(),
        }
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_database(mut self, database_index: i64) -> Self {
        self.database_index = database_index;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// `host:port` form used in logs
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate a single connection entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "connection name cannot be empty".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "connection '{}' has an empty host",
                self.name
            )));
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationError(format!(
                "connection '{}' port must be greater than 0",
                self.name
            )));
        }

        if self.database_index < 0 {
            return Err(ConfigError::ValidationError(format!(
                "connection '{}' database_index cannot be negative",
                self.name
            )));
        }

        if self.pool_size == 0 {
            return Err(ConfigError::ValidationError(format!(
                "connection '{}' pool_size must be greater than 0",
                self.name
            )));
        }

        Ok(())
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &password)
            .field("database_index", &self.database_index)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.command_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.router.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.router.health_check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "health_check_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.router.journal_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "journal_capacity must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for connection in &self.connections {
            connection.validate()?;
            if !seen.insert(connection.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate connection name: {}",
                    connection.name
                )));
            }
        }

        if let Some(default) = &self.router.default_connection {
            if !seen.contains(default.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "default_connection '{}' is not a configured connection",
                    default
                )));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        match self.logging.format.as_str() {
            "text" | "compact" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log format: {}", self.logging.format)
            )),
        }

        Ok(())
    }

    /// Name of the connection that should be active after registration
    pub fn default_connection(&self) -> Option<&str> {
        self.router
            .default_connection
            .as_deref()
            .or_else(|| self.connections.first().map(|c| c.name.as_str()))
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            router: RouterConfig {
                default_connection: Some("primary".to_string()),
                ..Default::default()
            },
            connections: vec![
                ConnectionConfig::new("primary", "127.0.0.1", 6379),
                ConnectionConfig::new("cache", "127.0.0.1", 6380)
                    .with_database(1)
                    .with_pool_size(20),
            ],
            ..Default::default()
        };

        config.save_to_file(path)
    }
}
