//! Log output for hosts running the fluid network.

use std::sync::Once;

use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Level used when `RUST_LOG` isn't set.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a formatting subscriber filtered by `RUST_LOG` and routes `log`
/// records into it.
///
/// Safe to call more than once. If the host already installed a subscriber, that
/// one is left alone.
pub fn init_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter);

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            return;
        }
        if let Err(e) = LogTracer::init() {
            tracing::warn!("Failed to forward log records: {e}");
        }
    });
}
