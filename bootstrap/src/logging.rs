//! Diagnostics for the bootstrap.
//!
//! Everything the bootstrap has to tell the user (fetching, self-update,
//! dirty-checkout fallbacks, build failures) goes through `tracing` on stderr
//! so that stdout stays reserved for machine-readable command output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset so self-update and build
/// progress stay visible.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=bootstrap=debug bootstrap ensure
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
