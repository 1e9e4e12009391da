use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::notifications::models::ChannelConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Environment variable {key} has an invalid value '{value}'")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("No delivery channel configured: set BOT_TOKEN or a [delivery] section")]
    MissingDelivery,
    #[error("ENCRYPTION_KEY is not set")]
    MissingEncryptionKey,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub database_url: String,
    pub log_dir: String,
    /// Hex-encoded 32-byte key for hosting credentials at rest.
    pub encryption_key: Option<String>,
    pub delivery: Option<ChannelConfig>,
    pub monitoring: MonitoringConfig,
    pub reminders: ReminderConfig,
    pub safety: SafetyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://hostwatch.db".to_string(),
            log_dir: "logs".to_string(),
            encryption_key: None,
            delivery: None,
            monitoring: MonitoringConfig::default(),
            reminders: ReminderConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub interval_minutes: u64,
    pub probe_timeout_seconds: u64,
    pub concurrency: usize,
    pub shutdown_grace_seconds: u64,
    /// Ports tried, in order, for bare-IP targets.
    pub ip_probe_ports: Vec<u16>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            probe_timeout_seconds: 10,
            concurrency: 10,
            shutdown_grace_seconds: 5,
            ip_probe_ports: vec![443, 80, 22],
        }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReminderConfig {
    pub hour: u32,
    pub minute: u32,
    pub run_on_startup: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            hour: 10,
            minute: 0,
            run_on_startup: true,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    pub allowed_schemes: Vec<String>,
    pub allowed_ports: Vec<u16>,
    pub blocked_hosts: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allowed_ports: vec![80, 443, 8080, 8443],
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "0.0.0.0",
                "::1",
                "metadata.google.internal",
                "169.254.169.254",
                "fd00:ec2::254",
                "100.100.100.200",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration: optional TOML file, then environment
    /// overrides, then validation.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match config_path {
            Some(path_str) => Self::from_file(Path::new(path_str))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Environment overrides file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = dir;
        }
        if let Some(key) = lookup("ENCRYPTION_KEY") {
            self.encryption_key = Some(key);
        }
        if let Some(token) = lookup("BOT_TOKEN") {
            match &mut self.delivery {
                Some(ChannelConfig::Telegram { bot_token }) => *bot_token = token,
                Some(ChannelConfig::Webhook { .. }) => {}
                None => self.delivery = Some(ChannelConfig::Telegram { bot_token: token }),
            }
        }

        if let Some(v) = parse_env(&lookup, "MONITORING_INTERVAL_MINUTES")? {
            self.monitoring.interval_minutes = v;
        }
        if let Some(v) = parse_env(&lookup, "MONITORING_TIMEOUT_SECONDS")? {
            self.monitoring.probe_timeout_seconds = v;
        }
        if let Some(v) = parse_env(&lookup, "MONITORING_CONCURRENCY")? {
            self.monitoring.concurrency = v;
        }
        if let Some(v) = parse_env(&lookup, "REMINDER_HOUR")? {
            self.reminders.hour = v;
        }
        if let Some(v) = parse_env(&lookup, "REMINDER_MINUTE")? {
            self.reminders.minute = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.interval_minutes == 0 {
            return Err(ConfigError::Invalid("monitoring.interval_minutes must be > 0".into()));
        }
        if self.monitoring.probe_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("monitoring.probe_timeout_seconds must be > 0".into()));
        }
        if self.monitoring.concurrency == 0 {
            return Err(ConfigError::Invalid("monitoring.concurrency must be > 0".into()));
        }
        if self.reminders.hour > 23 || self.reminders.minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "reminder time {:02}:{:02} is out of range",
                self.reminders.hour, self.reminders.minute
            )));
        }
        if let Some(ChannelConfig::Telegram { bot_token }) = &self.delivery {
            if bot_token.trim().is_empty() {
                return Err(ConfigError::Invalid("delivery.bot_token is empty".into()));
            }
        }
        Ok(())
    }

    pub fn require_delivery(&self) -> Result<&ChannelConfig, ConfigError> {
        self.delivery.as_ref().ok_or(ConfigError::MissingDelivery)
    }

    pub fn require_encryption_key(&self) -> Result<&str, ConfigError> {
        self.encryption_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingEncryptionKey)
    }
}

fn parse_env<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
