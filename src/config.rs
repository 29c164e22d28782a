//! Configuration management for keybucket.

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KeybucketError, Result};
use crate::ratelimit::{Rate, DEFAULT_MAX_KEYS};

/// Prefix for environment overrides, e.g. `KEYBUCKET__LIMITER__RATE=50`.
pub const ENV_PREFIX: &str = "KEYBUCKET";

/// Main configuration for keybucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeybucketConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Units allowed per window
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Maximum number of tracked keys
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            window_ms: default_window_ms(),
            max_keys: default_max_keys(),
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Validate into a [`Rate`].
    pub fn rate(&self) -> Result<Rate> {
        Rate::new(self.rate, self.window())
    }
}

fn default_rate() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    1000
}

fn default_max_keys() -> usize {
    DEFAULT_MAX_KEYS
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl KeybucketConfig {
    /// Load configuration from an optional YAML file plus `KEYBUCKET__*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let config: KeybucketConfig = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Yaml));
        }

        let config: KeybucketConfig = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.limiter.rate()?;
        if self.limiter.max_keys == 0 {
            return Err(KeybucketError::InvalidMaxKeys);
        }
        Ok(())
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| KeybucketError::Config(e.to_string()))
    }
}
