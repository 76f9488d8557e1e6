//! Logging initialization, driven by [`DmmsConfig`]'s `LOG_LEVEL`,
//! `ENABLE_LOGGING`, and `LOG_FILE_NAME` fields.
//!
//! When logging is enabled and a file name is configured, spans and events go
//! to that file; otherwise they go to stderr. Document content never appears
//! in log lines — only hashes, IDs, and counts (enforced by convention at
//! every `tracing::instrument` call site, not by this module).

use std::fs::OpenOptions;

use tracing_subscriber::EnvFilter;

use crate::config::DmmsConfig;

/// Initialize the global `tracing` subscriber for this process.
///
/// # Errors
/// Returns an error if `LOG_FILE_NAME` is configured but the file cannot be
/// opened for appending.
pub fn init(config: &DmmsConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.enable_logging {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        return Ok(());
    }

    match &config.log_file_name {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(file).init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
    Ok(())
}
