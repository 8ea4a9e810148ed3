//! Telemetry
//!
//! Sets up `tracing-subscriber` for structured logging. The filter comes
//! from `RUST_LOG` when set, otherwise from the configured log level.
//! Debug builds print human-readable output; release builds emit JSON.

use crate::config::Config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a log level
///
/// The engine's own target is listed explicitly so `RUST_LOG`-style
/// overrides for dependencies do not silence it.
pub fn default_filter(log_level: &str) -> String {
    format!("{},lodestar_engine={}", log_level, log_level)
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info".
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}

/// Initialize from the `core.log_level` setting
pub fn init_telemetry_from_config(config: &Config) {
    init_telemetry_with_level(&config.core.log_level);
}

/// Initialize with "info" unless `RUST_LOG` says otherwise
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}
