// ============================================================================
// Tracing Setup
// ============================================================================

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when RUST_LOG is unset or unparsable
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global subscriber
///
/// Runs before configuration is loaded, so the filter comes straight from
/// RUST_LOG rather than from `Config`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
