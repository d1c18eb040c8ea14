//! Configuration Loader
//!
//! Environment-aware loading: detect the environment, layer defaults, an
//! optional file and `PIPELINE_DISPATCH_*` variables, then validate.

use super::DispatcherConfig;
use crate::error::ConfigResult;
use config::{Config, Environment, File};
use std::env;
use std::path::Path;
use tracing::debug;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "PIPELINE_DISPATCH";

/// Loads [`DispatcherConfig`] from layered sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with environment auto-detection and no file.
    pub fn load() -> ConfigResult<DispatcherConfig> {
        Self::load_with_env(None, &Self::detect_environment())
    }

    /// Load with environment auto-detection, layering `path` over the defaults.
    pub fn load_from_file(path: &Path) -> ConfigResult<DispatcherConfig> {
        Self::load_with_env(Some(path), &Self::detect_environment())
    }

    /// Load for an explicit environment.
    ///
    /// Skips detection, so tests need not touch process-wide variables.
    pub fn load_with_env(path: Option<&Path>, environment: &str) -> ConfigResult<DispatcherConfig> {
        debug!(
            environment = environment,
            file = ?path,
            "Loading dispatcher configuration"
        );

        let defaults = Config::try_from(&DispatcherConfig::for_environment(environment))?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DispatcherConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %config.environment,
            catch_panics = config.dispatch.catch_panics,
            warn_on_shadowing = config.dispatch.warn_on_shadowing,
            log_level = %config.logging.level,
            "Dispatcher configuration loaded"
        );
        Ok(config)
    }

    /// Current environment from `PIPELINE_DISPATCH_ENV`, then `APP_ENV`,
    /// defaulting to `development`.
    pub fn detect_environment() -> String {
        env::var(format!("{ENV_PREFIX}_ENV"))
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
