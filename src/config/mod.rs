//! # Dispatcher Configuration
//!
//! Settings for the dispatcher and its logging, loaded by [`ConfigLoader`]
//! from layered sources:
//!
//! 1. Environment-aware defaults ([`DispatcherConfig::for_environment`])
//! 2. An optional file; format follows the extension (`.toml`, `.yaml`, `.json`)
//! 3. Environment variables prefixed `PIPELINE_DISPATCH_`, nested with `__`
//!    (e.g. `PIPELINE_DISPATCH_DISPATCH__CATCH_PANICS=false`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeline_dispatch::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! assert!(config.dispatch.catch_panics);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::error::{ConfigResult, ConfigurationError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Deployment environment (`development`, `test`, `production`, ...)
    pub environment: String,

    /// Dispatch behavior
    pub dispatch: DispatchSettings,

    /// Structured logging
    pub logging: LoggingConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::for_environment("development")
    }
}

impl DispatcherConfig {
    /// Defaults for `environment`.
    pub fn for_environment(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            dispatch: DispatchSettings::default(),
            logging: LoggingConfig::for_environment(environment),
        }
    }

    /// Whether this is a production deployment.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check values that deserialize but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                field: "environment".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.logging.validate()
    }
}

/// Dispatch behavior settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Convert handler panics into `DispatchError::HandlerPanicked` instead of
    /// unwinding into the caller
    pub catch_panics: bool,

    /// Log every registry pair where an earlier descriptor shadows a later one
    /// when the dispatcher is created
    pub warn_on_shadowing: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            catch_panics: true,
            warn_on_shadowing: true,
        }
    }
}

/// Structured logging settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_environment("development")
    }
}

impl LoggingConfig {
    /// Defaults for `environment`: verbose outside production, JSON in production.
    pub fn for_environment(environment: &str) -> Self {
        let production = environment == "production";
        Self {
            level: if production { "info" } else { "debug" }.to_string(),
            json: production,
            with_thread_ids: true,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        EnvFilter::try_new(&self.level)
            .map(|_| ())
            .map_err(|error| ConfigurationError::InvalidValue {
                field: "logging.level".to_string(),
                reason: error.to_string(),
            })
    }
}
