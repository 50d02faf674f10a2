//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

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
/// duckbridge::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

fn default_filter(level: &str) -> String {
    format!("duckbridge={},tower_http=debug", level)
}

/// Shorten a credential for log output
///
/// Upstream tokens are session secrets; only a short prefix is ever logged.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    if prefix.len() < secret.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}
