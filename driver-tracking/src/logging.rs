//! Logging setup for hosts embedding the tracking core.
//!
//! Installs a `tracing` subscriber that writes compact lines to stderr.
//! The filter defaults to `info` and can be overridden with `RUST_LOG`,
//! e.g. `RUST_LOG=driver_tracking_lib=debug`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber
///
/// Returns false if a subscriber was already installed, in which case the
/// existing one is kept.
pub fn init_logging() -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()
        .is_ok()
}
