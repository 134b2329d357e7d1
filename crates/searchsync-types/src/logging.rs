//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `Settings::log_level`. Returns false when a
/// subscriber was already installed, so tests can call this freely.
pub fn init_logging(settings: &Settings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
