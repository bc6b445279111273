//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingSection};

/// Build the filter: `RUST_LOG` wins over the configured directive.
fn env_filter(configured: &str) -> Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid RUST_LOG filter '{}'", directive)),
        _ => EnvFilter::try_new(configured)
            .with_context(|| format!("Invalid logging filter '{}'", configured)),
    }
}

/// Install the global subscriber. Calling this twice is an error from
/// `tracing`, so the CLI calls it once at startup.
pub fn init(section: &LoggingSection) -> Result<()> {
    let filter = env_filter(&section.filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    match section.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}
