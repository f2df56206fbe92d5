//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use crate::config::LogFormat;
use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Default filter directives for `level`
pub fn default_filter(level: &str) -> String {
    format!("chat_relay={},tower_http=info", level)
}

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// Reads log level from RUST_LOG environment variable, defaulting to the
/// level specified in config (or "info" if not set).
///
/// # Examples
///
/// ```no_run
/// use chat_relay::config::LogFormat;
///
/// chat_relay::telemetry::init("info", LogFormat::Pretty);
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str, format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        let registry = tracing_subscriber::registry().with(filter);
        match format {
            LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .init(),
        }
    });
}
