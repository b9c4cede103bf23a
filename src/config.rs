//! # Configuration Management
//!
//! Server configuration, loaded from TOML, environment variables, or defaults.
//!
//! ## Sections
//! - `server`: listen address, connection limits, read sizing, timeouts
//! - `protocol`: advertised version, MOTD and player cap
//! - `logging`: tracing output
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()` (`MCPROTO_*`)
//! - Direct instantiation with defaults
//!
//! Durations are written as milliseconds.

use crate::core::frame::MAX_FRAME_LENGTH;
use crate::error::{ProtocolError, Result};
use crate::protocol::clientbound::StatusInfo;
use crate::protocol::packets::{self, DEFAULT_PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default listen port of a Minecraft server.
pub const DEFAULT_PORT: u16 = 25565;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Listener and connection handling
    #[serde(default)]
    pub server: ServerConfig,

    /// What the server advertises to clients
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `MCPROTO_*` environment variables.
    ///
    /// Unparseable numeric values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("MCPROTO_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Some(val) = env_number::<usize>("MCPROTO_MAX_CONNECTIONS")? {
            config.server.max_connections = val;
        }

        if let Some(val) = env_number::<usize>("MCPROTO_WORKER_THREADS")? {
            config.server.worker_threads = val;
        }

        if let Some(val) = env_number::<u64>("MCPROTO_POLL_TIMEOUT_MS")? {
            config.server.poll_timeout = Duration::from_millis(val);
        }

        if let Ok(level) = std::env::var("MCPROTO_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid MCPROTO_LOG_LEVEL: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Returns every problem found. Empty means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.protocol.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid {key}: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Listener and connection handling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:25565")
    pub address: String,

    /// Sockets accepted beyond this are closed immediately
    pub max_connections: usize,

    /// Upper bound on a single socket read
    pub read_buffer_size: usize,

    /// Longest a blocking wait runs before the running flag is checked again
    #[serde(with = "duration_serde")]
    pub poll_timeout: Duration,

    /// Handler threads; 0 runs handlers on the connection's reader task
    pub worker_threads: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Largest accepted frame body
    pub max_frame_length: usize,

    /// How often keep-alives are sent to players
    #[serde(with = "duration_serde")]
    pub keep_alive_interval: Duration,

    /// Players silent for longer than this are disconnected
    #[serde(with = "duration_serde")]
    pub keep_alive_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 1000,
            read_buffer_size: 4096,
            poll_timeout: Duration::from_millis(100),
            worker_threads: 4,
            shutdown_timeout: Duration::from_secs(10),
            max_frame_length: MAX_FRAME_LENGTH,
            keep_alive_interval: Duration::from_secs(15),
            keep_alive_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:25565')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.read_buffer_size < 64 {
            errors.push("Read buffer too small (minimum: 64 bytes)".to_string());
        } else if self.read_buffer_size > 1024 * 1024 {
            errors.push("Read buffer too large (maximum: 1 MB)".to_string());
        }

        if self.poll_timeout.as_millis() < 1 {
            errors.push("Poll timeout too short (minimum: 1ms)".to_string());
        } else if self.poll_timeout.as_secs() > 10 {
            errors.push("Poll timeout too long (maximum: 10s)".to_string());
        }

        if self.worker_threads > 256 {
            errors.push(format!(
                "Too many worker threads: {} (maximum: 256)",
                self.worker_threads
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_frame_length == 0 {
            errors.push("Max frame length must be greater than 0".to_string());
        } else if self.max_frame_length > MAX_FRAME_LENGTH {
            errors.push(format!(
                "Max frame length too large: {} (maximum: {MAX_FRAME_LENGTH})",
                self.max_frame_length
            ));
        }

        if self.keep_alive_interval.as_millis() < 100 {
            errors.push("Keep-alive interval too short (minimum: 100ms)".to_string());
        }

        if self.keep_alive_timeout <= self.keep_alive_interval {
            errors.push("Keep-alive timeout must be longer than the keep-alive interval".to_string());
        }

        errors
    }
}

/// What the server advertises in status responses and accepts at login
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Protocol number reported to clients
    pub protocol_version: i32,

    /// Human-readable version (e.g., "1.12.2")
    pub version_name: String,

    /// Message of the day shown in the server list
    pub motd: String,

    /// Player cap shown in the server list
    pub max_players: u32,

    /// Encryption and session authentication; only offline mode is implemented
    pub online_mode: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let status = StatusInfo::default();
        Self {
            protocol_version: status.protocol_version,
            version_name: status.version_name,
            motd: status.motd,
            max_players: status.max_players,
            online_mode: false,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !packets::is_supported(self.protocol_version) {
            errors.push(format!(
                "Unsupported protocol version: {} (supported: {DEFAULT_PROTOCOL_VERSION})",
                self.protocol_version
            ));
        }

        if self.version_name.is_empty() {
            errors.push("Version name cannot be empty".to_string());
        }

        if self.motd.len() > 256 {
            errors.push(format!(
                "MOTD too long: {} bytes (maximum: 256)",
                self.motd.len()
            ));
        }

        if self.online_mode {
            errors.push("Online mode is not supported; set online_mode = false".to_string());
        }

        errors
    }

    /// The status block sent to server-list pings.
    pub fn status_info(&self) -> StatusInfo {
        StatusInfo {
            version_name: self.version_name.clone(),
            protocol_version: self.protocol_version,
            motd: self.motd.clone(),
            max_players: self.max_players,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("mcproto"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            match self.log_file_path {
                Some(ref path) => {
                    if let Some(parent) = Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() && !parent.exists() {
                            errors.push(format!(
                                "Log file directory does not exist: {}",
                                parent.display()
                            ));
                        }
                    }
                }
                None => errors
                    .push("log_file_path must be specified when log_to_file is true".to_string()),
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Durations as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `tracing::Level` as a lowercase name
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.to_string().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
