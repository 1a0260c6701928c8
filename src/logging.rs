//! Diagnostic logging for binaries and demos.
//!
//! The library only emits `tracing` events; installing a subscriber is left to the
//! application. [`init`] is the default choice: `RUST_LOG` filtering (default `warn`), compact
//! output on stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// ```bash
/// RUST_LOG=item_pipeline=debug cargo run --example companies
/// ```
///
/// # Panics
///
/// Panics if a global subscriber is already installed; use [`try_init`] where that can happen.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Like [`init`], but returns `false` instead of panicking when a subscriber already exists.
pub fn try_init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .is_ok()
}
