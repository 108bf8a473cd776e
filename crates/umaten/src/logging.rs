//! Process-wide log setup.
//!
//! The crate logs through both `log` (stores, scheduler) and `tracing`
//! (pipeline spans). `init_logging` installs one tracing subscriber and routes
//! `log` records into it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::schema::LoggingConfig;
use crate::error::ConfigError;

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::Logging(format!("invalid level '{}': {}", config.level, e))),
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;

    let subscriber = Registry::default()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!config.json).then(|| fmt::layer().with_target(true)));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    log::debug!("Logging initialized (level: {}, json: {})", config.level, config.json);
    Ok(())
}
