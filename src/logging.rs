//! Logging setup for the binary
//!
//! JSON lines in production, human-readable output otherwise. `RUST_LOG`
//! overrides the configured level and filter when set.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Directive string for the configured level plus extra filters
pub fn filter_directives(config: &LogConfig) -> String {
    let level = config.level.trim();
    let level = if level.is_empty() { "info" } else { level };
    match config.filter.as_deref().map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("{},{}", level, extra),
        _ => level.to_string(),
    }
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env().context("invalid RUST_LOG");
    }
    let directives = filter_directives(config);
    EnvFilter::try_new(&directives).with_context(|| format!("invalid log filter '{}'", directives))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig, json: bool) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder
            .json()
            .with_current_span(false)
            .try_init()
            .map_err(|e| anyhow!("failed to install logger: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow!("failed to install logger: {}", e))
    }
}

/// Log panics that escape every handler before the default hook runs
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();

        tracing::error!(panic = %payload, location = %location, "uncaught error");
        default_hook(info);
    }));
}
