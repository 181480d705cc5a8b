// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Level is read from the `MICROFLOW_LOG` environment variable (an
//! `EnvFilter` directive string, e.g. `"info"` or
//! `"microflow=debug,tower=warn"`), defaulting to `info` when unset.
//!
//! Logs are sent to STDERR so that any future stdout-consuming integration
//! can rely on stdout staying free.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber. Safe to call once at startup;
/// calling it twice panics, so callers that may init more than once (tests
/// in particular) should go through `microflow_test_utils::init_tracing`,
/// which guards against that.
pub fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_env("MICROFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
