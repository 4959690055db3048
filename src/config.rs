//! Resilience configuration.
//!
//! Retry policy, breaker thresholds and the database transient-code table are
//! read from a TOML file layered over built-in defaults, with environment
//! overrides in the form `STEADFAST__<SECTION>__<KEY>`
//! (e.g. `STEADFAST__RETRY__MAX_ATTEMPTS=5`,
//! `STEADFAST__BREAKERS__DATABASE__COOLDOWN_MS=30000`).

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::breaker::{BreakerConfig, BreakerRegistry, AI_GENERATION, DATABASE};
use crate::error::{Classifier, DatabaseErrorPolicy};
use crate::retry::RetryPolicy;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "STEADFAST";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// The path is not valid UTF-8.
    #[error("Invalid configuration path: {0}")]
    InvalidPath(String),

    /// The sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The values are out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the whole resilience layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Default retry policy for dependency calls.
    pub retry: RetryPolicy,
    /// One breaker per dependency, keyed by dependency name.
    pub breakers: BTreeMap<String, BreakerConfig>,
    /// Database not-found and transient tables.
    pub database: DatabaseErrorPolicy,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let mut breakers = BTreeMap::new();
        breakers.insert(DATABASE.to_string(), BreakerConfig::default());
        breakers.insert(AI_GENERATION.to_string(), BreakerConfig::default());

        Self {
            retry: RetryPolicy::default(),
            breakers,
            database: DatabaseErrorPolicy::default(),
        }
    }
}

impl ResilienceConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys take their defaults, and the `database` and `ai_generation`
    /// breakers always exist even if the file lists other dependencies only.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration file does not exist
    /// - The configuration file cannot be parsed
    /// - A value is out of range
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use steadfast::config::ResilienceConfig;
    ///
    /// let config = ResilienceConfig::load("steadfast.toml")?;
    /// # Ok::<(), steadfast::config::ConfigError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        Self::build(Some(path_str))
    }

    /// Load configuration from defaults and environment overrides only.
    pub fn from_env() -> ConfigResult<Self> {
        Self::build(None)
    }

    /// Parse configuration from TOML text.
    ///
    /// Environment overrides are not applied.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn build(path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> ConfigResult<Self> {
        let mut parsed: Self = config.try_deserialize()?;
        // Listing one breaker must not drop the others the application relies on.
        for name in [DATABASE, AI_GENERATION] {
            parsed.breakers.entry(name.to_string()).or_default();
        }
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if let (Some(max), base) = (self.retry.max_delay_ms, self.retry.base_delay_ms) {
            if max < base {
                return Err(ConfigError::Invalid(format!(
                    "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                    max, base
                )));
            }
        }
        for (name, breaker) in &self.breakers {
            if breaker.failure_threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "breakers.{}.failure_threshold must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Build a classifier that uses this configuration's database policy.
    pub fn classifier(&self) -> Classifier {
        Classifier::new().with_database_policy(self.database.clone())
    }

    /// Build the breaker registry for this configuration.
    pub fn registry(&self) -> BreakerRegistry {
        BreakerRegistry::from_config(self)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
