//! Diagnostic logging setup
//!
//! Installs the `tracing-subscriber` used by applications embedding the task
//! loop. Config-driven level, `RUST_LOG` override, pretty output in debug
//! builds and JSON in release builds.

use crate::config::Config;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a level: applies globally and to the engine's own targets.
fn filter_directive(log_level: &str) -> String {
    format!(
        "{level},taskloop_engine={level},taskloop={level}",
        level = log_level
    )
}

/// Initialize the tracing subscriber with the given log level.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// Calling it more than once is harmless; only the first call installs a
/// subscriber.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

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

/// Initialize the tracing subscriber from a loaded configuration
pub fn init_telemetry_from_config(config: &Config) {
    init_telemetry_with_level(&config.core.log_level);
}

/// Initialize the tracing subscriber at "info" unless `RUST_LOG` says otherwise
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}
