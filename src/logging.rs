//! # Structured Logging Module
//!
//! Process-wide `tracing` subscriber setup plus a few structured log helpers
//! shared by the dispatcher.

use crate::config::LoggingConfig;
use crate::error::ResolutionError;
use crate::registry::Shadowing;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Runs once per process; if another
/// subscriber is already installed it is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let layer = if config.json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(config.with_thread_ids)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(config.with_thread_ids)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = std::process::id(),
            json = config.json,
            level = %config.level,
            "Structured logging initialized"
        );
    });
}

/// Log a resolution failure with the pair it got stuck on.
pub fn log_resolution_failure(error: &ResolutionError) {
    tracing::error!(
        request = %error.request,
        response = %error.response,
        stuck_request = %error.stuck_request,
        stuck_response = %error.stuck_response,
        resolved = ?error.resolved,
        "Chain resolution failed"
    );
}

/// Log each registry pair where registration order hides a descriptor.
pub fn log_shadowing(shadowed: &[Shadowing]) {
    for shadowing in shadowed {
        tracing::warn!(
            earlier = %shadowing.earlier,
            later = %shadowing.later,
            request = %shadowing.request,
            response = %shadowing.response,
            "Descriptor is shadowed by an earlier registration"
        );
    }
}
