//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn parse_filter(level: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))
}

fn build_filter(default_level: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| parse_filter(default_level))
}

/// Setup tracing subscriber for the service
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = build_filter(default_level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))
}

/// Route logs through the test harness capture
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging() {
    if let Ok(filter) = build_filter("debug") {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().with_thread_names(true))
            .try_init();
    }
}
