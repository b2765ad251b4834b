//! Tracing subscriber setup shared by every binary

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Filter directive when `RUST_LOG` is unset: `debug` with `--verbose`,
/// otherwise the configured level
pub fn default_directive(verbose: bool, config: &LoggingConfig) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

pub fn init_logging(verbose: bool, config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose, config)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;

    Ok(())
}
