//! Configuration loading from file and environment variables.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use streamtap_push::{DEFAULT_HUB_URL, MIN_LEASE};
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Target channel and application credentials.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Chat login. Absent means anonymous, read-only chat.
    #[serde(default)]
    pub bot: Option<BotConfig>,

    /// Push notifications. Absent disables the push producer.
    #[serde(default)]
    pub push: Option<PushSettings>,

    #[serde(default)]
    pub donations: DonationsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Channel login, e.g. "somechannel".
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct BotConfig {
    pub name: String,

    /// Chat token, with or without the `oauth:` prefix.
    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushSettings {
    /// Public base URL the hub calls back.
    pub callback_url: String,

    /// Port to serve callbacks on. Absent means middleware mode.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,

    #[serde(default = "default_hub_url")]
    pub hub_url: String,
}

impl PushSettings {
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            port: None,
            lease_seconds: default_lease_seconds(),
            hub_url: default_hub_url(),
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationsConfig {
    /// Relay donations flagged as tests.
    #[serde(default)]
    pub accept_test: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "streamtap_push=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_lease_seconds() -> u64 {
    streamtap_push::DEFAULT_LEASE.as_secs()
}

fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
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

    /// An environment override could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("push.lease_seconds must be at least {minimum}, got {seconds}")]
    LeaseTooShort { seconds: u64, minimum: u64 },
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies overrides from the process environment.
///
/// Environment variable overrides:
/// - `STREAMTAP_CHANNEL` overrides `channel.name`
/// - `STREAMTAP_CLIENT_ID` overrides `channel.client_id`
/// - `STREAMTAP_CLIENT_SECRET` overrides `channel.client_secret`
/// - `STREAMTAP_BOT_NAME` / `STREAMTAP_BOT_TOKEN` override `bot.*`
/// - `STREAMTAP_CALLBACK_URL` overrides `push.callback_url`
/// - `STREAMTAP_PORT` overrides `push.port`
/// - `STREAMTAP_LOG_LEVEL` overrides `logging.level`
/// - `STREAMTAP_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// if an override cannot be parsed, or if the push lease is too short.
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

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;

    if let Some(push) = &config.push {
        if push.lease() < MIN_LEASE {
            return Err(ConfigError::LeaseTooShort {
                seconds: push.lease_seconds,
                minimum: MIN_LEASE.as_secs(),
            });
        }
    }
    Ok(config)
}

/// Applies `STREAMTAP_*` overrides read through `var`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidOverride` for a `STREAMTAP_PORT` that is
/// not a port number.
pub fn apply_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(name) = var("STREAMTAP_CHANNEL") {
        config.channel.name = name;
    }
    if let Some(client_id) = var("STREAMTAP_CLIENT_ID") {
        config.channel.client_id = client_id;
    }
    if let Some(secret) = var("STREAMTAP_CLIENT_SECRET") {
        config.channel.client_secret = secret;
    }

    if let Some(name) = var("STREAMTAP_BOT_NAME") {
        match &mut config.bot {
            Some(bot) => bot.name = name,
            None => {
                config.bot = Some(BotConfig {
                    name,
                    token: String::new(),
                })
            }
        }
    }
    if let (Some(token), Some(bot)) = (var("STREAMTAP_BOT_TOKEN"), config.bot.as_mut()) {
        bot.token = token;
    }

    if let Some(url) = var("STREAMTAP_CALLBACK_URL") {
        match &mut config.push {
            Some(push) => push.callback_url = url,
            None => config.push = Some(PushSettings::new(url)),
        }
    }
    if let (Some(port), Some(push)) = (var("STREAMTAP_PORT"), config.push.as_mut()) {
        let parsed = port.trim().parse().map_err(|_| ConfigError::InvalidOverride {
            key: "STREAMTAP_PORT",
            value: port.clone(),
        })?;
        push.port = Some(parsed);
    }

    if let Some(level) = var("STREAMTAP_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("STREAMTAP_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    Ok(())
}
