// src/logging.rs
// =============================================================================
// Sets up `tracing` output.
//
// Logs go to stderr so the report on stdout (especially --json) stays clean.
// RUST_LOG, when set, replaces the default filter entirely.
// =============================================================================

use anyhow::Result;
use tracing_subscriber::EnvFilter;

pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("site_crawler={}", default_level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot initialize logging: {}", e))?;

    Ok(())
}
