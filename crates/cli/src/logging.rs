//! Tracing subscriber setup.

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global subscriber.  Logs go to stderr so stdout stays
/// reserved for command output.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("failed to configure tracing level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
