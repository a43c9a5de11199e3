use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_CONFIG_PATH: &str = "CLOSEFLOW_CONFIG";
const ENV_DATABASE_URL: &str = "CLOSEFLOW_DATABASE_URL";
const ENV_DB_MAX_CONNECTIONS: &str = "CLOSEFLOW_DB_MAX_CONNECTIONS";
const ENV_DB_TIMEOUT_SECS: &str = "CLOSEFLOW_DB_TIMEOUT_SECS";
const ENV_BIND_ADDRESS: &str = "CLOSEFLOW_BIND_ADDRESS";
const ENV_PORT: &str = "CLOSEFLOW_PORT";
const ENV_ATTACHMENT_DIR: &str = "CLOSEFLOW_ATTACHMENT_DIR";
const ENV_LOG_LEVEL: &str = "CLOSEFLOW_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "CLOSEFLOW_LOG_FORMAT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub attachments: AttachmentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentConfig {
    pub dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Programmatic overrides, applied last (after file and environment).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub attachment_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    attachments: RawAttachments,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttachments {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://closeflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            attachments: AttachmentConfig { dir: PathBuf::from("attachments") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then optional TOML file, then `CLOSEFLOW_*`
    /// environment variables, then programmatic overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(&options) {
            match fs::read_to_string(&path) {
                Ok(contents) => {
                    let raw: RawConfig = toml::from_str(&contents)
                        .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                    config.apply_raw(raw)?;
                }
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    if options.require_file {
                        return Err(ConfigError::MissingConfigFile(path));
                    }
                }
                Err(source) => return Err(ConfigError::ReadFile { path, source }),
            }
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_raw(&mut self, raw: RawConfig) -> Result<(), ConfigError> {
        if let Some(url) = raw.database.url {
            self.database.url = url;
        }
        if let Some(max_connections) = raw.database.max_connections {
            self.database.max_connections = max_connections;
        }
        if let Some(timeout_secs) = raw.database.timeout_secs {
            self.database.timeout_secs = timeout_secs;
        }
        if let Some(bind_address) = raw.server.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = raw.server.port {
            self.server.port = port;
        }
        if let Some(dir) = raw.attachments.dir {
            self.attachments.dir = dir;
        }
        if let Some(level) = raw.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = raw.logging.format {
            self.logging.format = parse_log_format("logging.format", &format)?;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        if let Some(raw) = read_env(ENV_DB_MAX_CONNECTIONS) {
            self.database.max_connections = parse_env(ENV_DB_MAX_CONNECTIONS, &raw)?;
        }
        if let Some(raw) = read_env(ENV_DB_TIMEOUT_SECS) {
            self.database.timeout_secs = parse_env(ENV_DB_TIMEOUT_SECS, &raw)?;
        }
        if let Some(bind_address) = read_env(ENV_BIND_ADDRESS) {
            self.server.bind_address = bind_address;
        }
        if let Some(raw) = read_env(ENV_PORT) {
            self.server.port = parse_env(ENV_PORT, &raw)?;
        }
        if let Some(dir) = read_env(ENV_ATTACHMENT_DIR) {
            self.attachments.dir = PathBuf::from(dir);
        }
        if let Some(level) = read_env(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(format) = read_env(ENV_LOG_FORMAT) {
            self.logging.format = parse_log_format(ENV_LOG_FORMAT, &format)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(attachment_dir) = overrides.attachment_dir {
            self.attachments.dir = attachment_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_owned()));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation("server.bind_address must not be empty".to_owned()));
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {LEVELS:?}, got `{}`",
                self.logging.level
            )));
        }
        Ok(())
    }
}

fn resolve_config_path(options: &LoadOptions) -> Option<PathBuf> {
    options
        .config_path
        .clone()
        .or_else(|| read_env(ENV_CONFIG_PATH).map(PathBuf::from))
        .or_else(|| Some(PathBuf::from("closeflow.toml")))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: raw.to_string() })
}

fn parse_log_format(key: &str, raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compact" => Ok(LogFormat::Compact),
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: raw.to_string() }),
    }
}
