//! Tracing subscriber setup for binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! application's call. `RUST_LOG` overrides the default directive.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber writing to stderr.
///
/// Returns an error if a global subscriber is already set.
pub fn init(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}
