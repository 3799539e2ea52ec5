//! Structured logging setup.
//!
//! Structured `tracing` subscriber, initialized once from `main`. Library
//! code never constructs a logger of its own; it just emits
//! `tracing::info!`/`warn!`/`error!` events and leaves subscription to the
//! binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `info` for this crate and `warn` for dependencies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("evidence_toolkit=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
