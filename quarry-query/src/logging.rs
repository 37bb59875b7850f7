//! Logging setup for Quarry.
//!
//! Quarry emits `tracing` events everywhere; this module optionally installs a
//! subscriber for them, controlled by environment variables:
//!
//! - `QUARRY_DEBUG=true|1|yes` - enable debug logging
//! - `QUARRY_LOG_LEVEL=trace|debug|info|warn|error` - set a specific level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! use quarry_query::logging;
//!
//! // Call once at startup.
//! logging::init();
//! ```
//!
//! Installing the subscriber needs the `tracing-subscriber` feature. Without
//! it, events go to whatever subscriber the host installed.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `QUARRY_DEBUG` is set to "true", "1" or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUARRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Log level from `QUARRY_LOG_LEVEL`.
///
/// Defaults to "debug" if `QUARRY_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("QUARRY_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Log format from `QUARRY_LOG_FORMAT`. Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("QUARRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the Quarry logging system. Subsequent calls are no-ops, and
/// nothing is installed unless `QUARRY_DEBUG` or `QUARRY_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUARRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "quarry={level},quarry_query={level},quarry_schema={level},quarry_sqlite={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // A host subscriber may already be installed.
            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format = get_log_format(), "Quarry logging initialized");
            }
        }
    });
}

/// Conditional debug logging, only when `QUARRY_DEBUG` is enabled at runtime.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}
