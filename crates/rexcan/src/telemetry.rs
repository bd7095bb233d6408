//! Process-wide logging setup for the binary.
//!
//! Component code logs through `log`; the bridge forwards those records
//! into the `tracing` subscriber so they share the pipeline spans.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{Result, RexcanError};

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| RexcanError::Logging(e.to_string()))?;

    let registry = Registry::default().with(filter);
    let installed = if config.json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        )
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
    };
    installed.map_err(|e| RexcanError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| RexcanError::Logging(e.to_string()))?;
    Ok(())
}
