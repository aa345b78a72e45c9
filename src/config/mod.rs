//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod network;

pub use network::{
    ControlConfig, DecodeErrorPolicy, LivestreamConfig, RequestFraming, DEFAULT_CONNECT_RETRIES,
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_CONTROL_ADDRESS, DEFAULT_LIVESTREAM_ADDRESS,
    DEFAULT_LIVESTREAM_TOPIC,
};

use serde::Deserialize;

use crate::transport::TransportConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "GATEWAY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "GATEWAY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "GATEWAY_LOG";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gRPC listener.
    pub transport: TransportConfig,
    /// Live telemetry subscription.
    pub livestream: LivestreamConfig,
    /// Control channel to the replay backend.
    pub control: ControlConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("livestream.topics")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.livestream.address.trim().is_empty() {
            return Err(ConfigError::Invalid("livestream.address is empty".to_string()));
        }
        if self.control.address.trim().is_empty() {
            return Err(ConfigError::Invalid("control.address is empty".to_string()));
        }
        if self.livestream.connect_timeout_ms == 0 || self.control.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.control.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.reply_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing: loopback listener, short timeouts.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.transport.tcp.host = "127.0.0.1".to_string();
        config.transport.tcp.port = 0;
        config.livestream.retry_delay_ms = 5;
        config.livestream.idle_backoff_ms = 1;
        config.livestream.connect_timeout_ms = 250;
        config.livestream.connect_retries = 2;
        config.control.reply_timeout_ms = 500;
        config.control.connect_timeout_ms = 250;
        config.control.connect_retries = 2;
        config
    }
}
