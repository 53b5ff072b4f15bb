//! Shared tracing setup for dropshop binaries.
//!
//! Structured JSON lines on stdout; the spans the engine opens (reserve,
//! completion, sweep) carry holder and item ids as fields, so one grep over
//! a reservation id reconstructs its whole lifecycle.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide tracing.
///
/// The filter comes from `RUST_LOG`, falling back to `info`. Safe to call
/// multiple times; subsequent calls become no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
