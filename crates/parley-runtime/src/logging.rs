//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! # Configuration-Based Initialization
//!
//! ```rust,ignore
//! use parley_runtime::{config, logging};
//!
//! let config = config::load_config()?;
//! logging::init_from_config(&config.logging);
//! ```
//!
//! `RUST_LOG` takes precedence over the configured base level when set;
//! per-module filters from the config are applied on top either way.

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize logging from a [`LoggingConfig`].
///
/// Never panics; double initialization (common in tests) is silently
/// ignored.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init_from_config(config);
}

/// Like [`init_from_config`] but surfaces initialization failure.
pub fn try_init_from_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = build_filter(config);

    match config.format {
        #[cfg(feature = "json-log")]
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
        #[cfg(not(feature = "json-log"))]
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(filter)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(filter)
            .try_init(),
        LogFormat::Full => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(filter)
            .try_init(),
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for (module, level) in &config.filters {
        if let Ok(directive) = format!("{module}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn filters_are_appended_to_the_base_level() {
        let config = LoggingConfig {
            level: "info".into(),
            format: LogFormat::Compact,
            filters: HashMap::from([("parley_core".to_string(), "debug".to_string())]),
        };
        // Just exercise the builder; the directive syntax is checked by
        // EnvFilter itself.
        let filter = build_filter(&config);
        assert!(filter.to_string().contains("parley_core=debug"));
    }
}
