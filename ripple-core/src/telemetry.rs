//! Logging setup.
//!
//! Installs a `tracing-subscriber` formatter. `RUST_LOG` takes precedence
//! over the configured level.

use tracing_subscriber::fmt::time::Uptime;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingOptions;

/// Install the global subscriber. Calling this twice is harmless.
pub fn init(options: &LoggingOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_directive()));

    let result = if options.compact {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(Uptime::default())
            .with_target(false)
            .compact()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
