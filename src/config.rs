//! # Driver Configuration
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! sim_mode = true
//! log_level = "info"
//! port_name = "/dev/ttyACM0"
//! sampling_interval = 500
//! items = ["digital:13:output", "analog:0:input"]
//! ```
//!
//! - `sim_mode` also accepts the strings `"true"` / `"false"`, so the value can
//!   come straight from an environment variable.
//! - Leave `port_name` out to use the first serial port found.
//! - `DRIVER_SIM_MODE`, `DRIVER_LOG_LEVEL` and `DRIVER_PORT` override the file,
//!   so one config can serve both production and a demo without hardware.

// src/config.rs - Single configuration file
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub const ENV_SIM_MODE: &str = "DRIVER_SIM_MODE";
pub const ENV_LOG_LEVEL: &str = "DRIVER_LOG_LEVEL";
pub const ENV_PORT: &str = "DRIVER_PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Settings for one board driver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub sim_mode: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub port_name: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Milliseconds between samples, also the throttle window length.
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: u64,
    /// Items registered at startup.
    #[serde(default)]
    pub items: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sim_mode: false,
            log_level: default_log_level(),
            port_name: None,
            baud: default_baud(),
            sampling_interval: default_sampling_interval(),
            items: Vec::new(),
        }
    }
}

// Default value functions
fn default_log_level() -> String { "warn".to_string() }
fn default_baud() -> u32 { 57600 }
// Boards default to 19ms which is far too chatty.
fn default_sampling_interval() -> u64 { 1000 }

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => Ok(flag),
        Flag::Text(text) => {
            parse_flag(&text).ok_or_else(|| D::Error::custom(format!("invalid boolean '{}'", text)))
        }
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "all" | "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "error" | "fatal" => Some(LevelFilter::ERROR),
        "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}

impl DriverConfig {
    /// Port name for log context and the simulator.
    pub fn port_label(&self) -> String {
        self.port_name.clone().unwrap_or_else(|| "auto".to_string())
    }

    pub fn log_filter(&self) -> Result<LevelFilter, ConfigError> {
        parse_level(&self.log_level).ok_or_else(|| ConfigError::InvalidValue {
            key: "log_level".to_string(),
            value: self.log_level.clone(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_filter()?;
        if self.sampling_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sampling_interval".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Apply `DRIVER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, `std::env` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SIM_MODE) {
            self.sim_mode = parse_flag(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_SIM_MODE.to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = lookup(ENV_PORT) {
            self.port_name = Some(value);
        }
        Ok(())
    }
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<DriverConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
