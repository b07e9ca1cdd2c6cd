//! Tracing subscriber setup for hosts and the demo binary.
//!
//! The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a human-readable subscriber.
///
/// Returns false when a global subscriber was already set, e.g. by the host.
///
/// ```no_run
/// indoor_bridge::logging::init();
/// tracing::info!("Bridge host started");
/// ```
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .try_init()
        .is_ok()
}

/// Installs a JSON subscriber for log aggregation
pub fn init_json() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_names(true))
        .try_init()
        .is_ok()
}
