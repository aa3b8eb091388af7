/// Structured logging setup for the hazard monitoring service.
///
/// Events carry the source key as a field so a single feed's failures can be
/// filtered out of the combined stream. Level comes from config but can be
/// overridden with `RUST_LOG`.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    Level(String),
    #[error("subscriber setup failed: {0}")]
    Init(String),
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let mut filter = EnvFilter::from_str(&config.level)
        .map_err(|_| LoggingError::Level(config.level.clone()))?;
    if let Ok(env) = std::env::var("RUST_LOG") {
        if let Ok(env_filter) = EnvFilter::try_new(env) {
            filter = env_filter;
        }
    }

    let fmt_layer = if config.json {
        // `.json()` switches both the event and the field formatter, so
        // fields land as structured JSON values rather than preformatted
        // text.
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let subscriber = Registry::default().with(filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| LoggingError::Init(e.to_string()))
}
