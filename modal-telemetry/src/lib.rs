//! Observability utilities for the tool host.
//!
//! Library crates only emit `tracing` events; binaries embedding the host
//! call [`init`] once at startup to print them.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Default filter directive used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter: `RUST_LOG` when set, `default` otherwise.
///
/// # Errors
///
/// Returns an error when `default` is not a valid filter directive.
pub fn env_filter(default: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default)
            .with_context(|| format!("invalid log filter `{default}`")),
    }
}

/// Installs a global fmt subscriber filtered by [`env_filter`].
///
/// # Errors
///
/// Returns an error when the filter is invalid or a global subscriber is
/// already installed.
pub fn init(default: &str) -> anyhow::Result<()> {
    let filter = env_filter(default)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
        .context("failed to install the tracing subscriber")?;
    tracing::debug!("tracing subscriber installed");
    Ok(())
}
