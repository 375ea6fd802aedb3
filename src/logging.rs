//! Structured logging setup.
//!
//! Library code only emits `tracing` events; binaries and tests that want to see
//! them call [`init`] once.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the `EnvFilter` directives.
pub const LOG_ENV: &str = "REFDIFF_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install a stderr fmt subscriber filtered by `REFDIFF_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
