use crate::record::{FieldValue, parse_custom_fields};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Ingestion API license key
    #[arg(long, env = "API_KEY", default_value = "")]
    pub api_key: String,

    /// Ingestion endpoint URL
    #[arg(long, env = "API_URL", default_value = "")]
    pub api_url: String,

    /// Application name attached to every record
    #[arg(long, env = "APPLICATION_NAME", default_value = "")]
    pub application_name: String,

    /// Number of records drained per flush cycle
    #[arg(long, env = "BATCH_SIZE", default_value = "2000")]
    pub batch_size: usize,

    /// Maximum compressed payload size per request, in bytes
    #[arg(long, env = "MAX_MESSAGE_SIZE", default_value = "1048576")]
    pub max_message_size: usize,

    /// Flush interval in milliseconds
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value = "120000")]
    pub flush_interval_ms: u64,

    /// Buffer capacity in cost units (roughly bytes)
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "2097152")]
    pub queue_capacity: u64,

    /// Log type tag attached to every record
    #[arg(long, env = "LOG_TYPE", default_value = "muleLog")]
    pub log_type: String,

    /// Static custom fields as comma-separated key=value pairs
    #[arg(long, env = "CUSTOM_FIELDS")]
    pub custom_fields: Option<String>,

    /// Merge custom fields flat into each event instead of nesting them
    /// under a single "custom" field
    #[arg(long, env = "MERGE_CUSTOM_FIELDS")]
    pub merge_custom_fields: bool,

    /// Consecutive failed flush cycles before the buffer is discarded
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Connection timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "30000")]
    pub connect_timeout_ms: u64,

    /// HTTP connection pool size
    #[arg(long, env = "CONN_POOL_SIZE", default_value = "5")]
    pub conn_pool_size: usize,

    /// Message redaction patterns, ^^-separated regular expressions
    #[arg(long, env = "SCRUB_PATTERNS")]
    pub scrub_patterns: Option<String>,

    /// Log level for the forwarder's own diagnostics
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub flush_interval: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: String::new(),
            application_name: String::new(),
            batch_size: 2000,
            max_message_size: 1_048_576,
            flush_interval_ms: 120_000,
            queue_capacity: 2_097_152,
            log_type: "muleLog".to_string(),
            custom_fields: None,
            merge_custom_fields: false,
            max_retries: 3,
            connect_timeout_ms: 30_000,
            conn_pool_size: 5,
            scrub_patterns: None,
            log_level: LogLevel::Info,
            config_file: None,
            flush_interval: Duration::from_millis(120_000),
            connect_timeout: Duration::from_millis(30_000),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        if let Some(path) = config.config_file.clone() {
            config = Config::from_file(path)?;
        }
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.post_process();
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) {
        self.flush_interval = Duration::from_millis(self.flush_interval_ms);
        self.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "API key must be provided".to_string(),
            ));
        }
        if self.application_name.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Application name must be provided".to_string(),
            ));
        }
        Url::parse(&self.api_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid API URL '{}': {e}", self.api_url))
        })?;

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max message size must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Flush interval must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max retries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed static custom fields.
    pub fn custom_field_map(&self) -> BTreeMap<String, FieldValue> {
        self.custom_fields
            .as_deref()
            .map(parse_custom_fields)
            .unwrap_or_default()
    }
}
