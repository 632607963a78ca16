//! Server configuration loading from file and environment variables.

use herald_audio::{MixingConfig, TtsConfig};
use herald_cast::DeviceConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Target playback device.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Speech synthesis engine.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Asset and cache directories, alarm mixing.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
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

    /// Base URL the device uses to fetch media, e.g. `http://192.168.1.10:5001`.
    ///
    /// When unset, the `Host` header of each request is used.
    #[serde(default)]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Directory holding the pre-shipped assets (alarm tones, `empty`).
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Directory the clip cache writes to.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(flatten)]
    pub mixing: MixingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "herald_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5001
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_cache_dir() -> String {
    "static/cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            cache_dir: default_cache_dir(),
            mixing: MixingConfig::default(),
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

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `HERALD_HOST` overrides `server.host`
/// - `HERALD_PORT` overrides `server.port`
/// - `HERALD_PUBLIC_URL` overrides `server.public_url`
/// - `HERALD_DEVICE_NAME` overrides `device.name`
/// - `HERALD_BRIDGE_URL` overrides `device.bridge_url`
/// - `HERALD_LANGUAGE` overrides `tts.default_language`
/// - `HERALD_TTS_ENGINE` overrides `tts.engine` (`google` or `espeak`)
/// - `HERALD_STATIC_DIR` overrides `audio.static_dir`
/// - `HERALD_CACHE_DIR` overrides `audio.cache_dir`
/// - `HERALD_LOG_LEVEL` overrides `logging.level`
/// - `HERALD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting configuration fails validation.
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

    apply_overrides(&mut config, |name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

/// Applies `HERALD_*` overrides read through `lookup`.
///
/// Unparseable numeric or enum values are ignored with a warning.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("HERALD_HOST") {
        match host.parse() {
            Ok(parsed) => config.server.host = parsed,
            Err(_) => tracing::warn!(value = %host, "ignoring invalid HERALD_HOST"),
        }
    }
    if let Some(port) = lookup("HERALD_PORT") {
        match port.parse() {
            Ok(parsed) => config.server.port = parsed,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid HERALD_PORT"),
        }
    }
    if let Some(url) = lookup("HERALD_PUBLIC_URL") {
        config.server.public_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    if let Some(name) = lookup("HERALD_DEVICE_NAME") {
        config.device.name = name;
    }
    if let Some(url) = lookup("HERALD_BRIDGE_URL") {
        config.device.bridge_url = url;
    }
    if let Some(language) = lookup("HERALD_LANGUAGE") {
        config.tts.default_language = language;
    }
    if let Some(engine) = lookup("HERALD_TTS_ENGINE") {
        match engine.parse() {
            Ok(parsed) => config.tts.engine = parsed,
            Err(e) => tracing::warn!("ignoring HERALD_TTS_ENGINE: {}", e),
        }
    }
    if let Some(dir) = lookup("HERALD_STATIC_DIR") {
        config.audio.static_dir = dir;
    }
    if let Some(dir) = lookup("HERALD_CACHE_DIR") {
        config.audio.cache_dir = dir;
    }
    if let Some(level) = lookup("HERALD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("HERALD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

/// Rejects values the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    let volume = config.device.alarm_volume;
    if !(0.0..=1.0).contains(&volume) {
        return invalid(format!("device.alarm_volume must be within [0, 1], got {volume}"));
    }
    if config.device.discovery_attempts == 0 {
        return invalid("device.discovery_attempts must be at least 1".to_string());
    }
    if config.device.name.trim().is_empty() {
        return invalid("device.name cannot be empty".to_string());
    }

    let mixing = &config.audio.mixing;
    if mixing.sample_rate == 0 {
        return invalid("audio.sample_rate must be positive".to_string());
    }
    for (field, gain) in [("pre_gain_db", mixing.pre_gain_db), ("post_gain_db", mixing.post_gain_db)] {
        if !gain.is_finite() || gain < 0.0 {
            return invalid(format!("audio.{field} must be a non-negative number, got {gain}"));
        }
    }

    if let Some(url) = &config.server.public_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return invalid(format!("server.public_url must be an http(s) URL, got {url:?}"));
        }
    }

    Ok(())
}
