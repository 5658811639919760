use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Dispatch policy, fixed once a processor is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// Maximum concurrent push workers per request (and across requests)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Retries allowed per delivery chain
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry, in seconds
    #[serde(default = "default_initial_backoff_seconds")]
    pub initial_backoff_seconds: u64,
    /// Capacity of the handoff queue
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "plain" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_workers() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_seconds() -> u64 {
    3
}

fn default_handoff_capacity() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "plain".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY_DISPATCH__MAX_WORKERS, RELAY_LOG__FORMAT, etc.
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(builder)
    }

    /// Parse settings from a TOML document layered over the defaults
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from_str(contents, FileFormat::Toml));
        Self::finish(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("dispatch.max_workers", default_max_workers() as u64)?
            .set_default("dispatch.max_retries", default_max_retries())?
            .set_default("dispatch.initial_backoff_seconds", default_initial_backoff_seconds())?
            .set_default("dispatch.handoff_capacity", default_handoff_capacity() as u64)?
            .set_default("log.level", default_log_level())?
            .set_default("log.format", default_log_format())
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.dispatch.validate()?;
        Ok(settings)
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Message(
                "dispatch.max_workers must be at least 1".to_string(),
            ));
        }
        if self.handoff_capacity == 0 {
            return Err(ConfigError::Message(
                "dispatch.handoff_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            initial_backoff_seconds: default_initial_backoff_seconds(),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
