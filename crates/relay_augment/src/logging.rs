//! Logging setup.
//!
//! The plugin runs inside a host process that may already have installed a
//! global tracing subscriber (another plugin, or the embedding launcher).
//! Setup therefore never panics: if a subscriber exists, the plugin's events
//! simply flow into it.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the logging system
///
/// Sets up a tracing registry with an `EnvFilter` and a `fmt` layer. The
/// `RUST_LOG` environment variable overrides the configured level.
///
/// # Returns
/// * `Ok(true)` - the subscriber was installed
/// * `Ok(false)` - a global subscriber already existed and was kept
pub fn setup_logging(settings: &LoggingSettings) -> Result<bool> {
    let filter = build_filter(&settings.level)?;

    let installed = if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .is_ok()
    };

    Ok(installed)
}

/// Filter from `RUST_LOG`, falling back to `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(level)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup_is_repeatable() {
        let settings = LoggingSettings::default();

        // Only one subscriber can be global; the second call must keep it
        // instead of failing.
        setup_logging(&settings).unwrap();
        assert!(!setup_logging(&settings).unwrap());
    }

    #[test]
    fn test_filter_accepts_configured_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(build_filter(level).is_ok());
        }
    }
}
