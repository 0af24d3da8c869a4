//! CLI utility functions

use std::io;
use tap_types::{Result, TapError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Setup logging based on verbosity level
pub fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let log_level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    // -v always wins over RUST_LOG
    let filter = if verbose {
        EnvFilter::new(log_level.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|e| TapError::config(format!("Failed to install logger: {}", e)))
}

/// Parse `key=value`
pub fn parse_key_value(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| TapError::config(format!("Expected key=value, got '{}'", pair)))
}

/// Human-readable parameter count
pub fn format_count(count: usize) -> String {
    const K: f64 = 1e3;
    const M: f64 = 1e6;
    const B: f64 = 1e9;

    let n = count as f64;
    if n >= B {
        format!("{:.2}B", n / B)
    } else if n >= M {
        format!("{:.1}M", n / M)
    } else if n >= K {
        format!("{:.1}K", n / K)
    } else {
        count.to_string()
    }
}
