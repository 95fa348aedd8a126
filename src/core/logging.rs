//! Structured logging for dn_bot
//!
//! - JSON output by default, pretty output with `LOG_FORMAT=pretty`
//! - Level filter from `RUST_LOG` (default `dn_bot=info`)
//! - Redaction helpers for API keys, Stark keys and signatures
//!
//! Log lines carry a bracketed prefix naming the subsystem: `[CYCLE]`,
//! `[ORDER]`, `[RETRY]`, `[REBALANCE]`, `[HUMANIZER]`, `[SESSION]`,
//! `[SHUTDOWN]`.
//!
//! ```rust,ignore
//! use dn_bot::core::logging::{init_logging, sanitize};
//!
//! init_logging();
//! tracing::info!(api_key = %sanitize(&account.credentials.api_key), "[SESSION] Account loaded");
//! ```

use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt as ts_fmt, fmt::format::FmtSpan, prelude::*, EnvFilter};

/// Flag to track if logging has been initialized (prevents double-init)
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "dn_bot=info";

/// Field names that must never be logged in clear.
///
/// Wrap matching values with `sanitize()` / `sanitize_signature()` and
/// `skip(...)` them in `#[instrument]`.
pub const SENSITIVE_FIELD_PATTERNS: &[&str] = &[
    "api_key",
    "private_key",
    "secret",
    "signature",
    "service_key",
    "ciphertext",
    "credential",
];

/// Wrapper for sensitive data that should be redacted in logs.
///
/// Values longer than 8 characters keep their first 4 characters,
/// shorter ones are fully redacted.
#[derive(Clone)]
pub struct SanitizedValue<'a>(&'a str);

impl<'a> SanitizedValue<'a> {
    pub fn new(value: &'a str) -> Self {
        Self(value)
    }

    /// The raw value. Never pass this to a log macro.
    pub fn expose(&self) -> &str {
        self.0
    }
}

impl<'a> fmt::Display for SanitizedValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get(..4) {
            Some(prefix) if self.0.len() > 8 => write!(f, "{}...REDACTED", prefix),
            _ => write!(f, "REDACTED"),
        }
    }
}

impl<'a> fmt::Debug for SanitizedValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SanitizedValue(***)")
    }
}

pub fn sanitize(value: &str) -> SanitizedValue<'_> {
    SanitizedValue::new(value)
}

/// Keep the first 8 characters of a signature or hash.
pub fn sanitize_signature(sig: &str) -> String {
    match sig.get(..8) {
        Some(prefix) if sig.len() > 12 => format!("{}...", prefix),
        _ => "REDACTED".to_string(),
    }
}

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter string (e.g., "dn_bot=debug,dn_bot::adapters=trace")
    pub level_filter: String,
    /// Use pretty format instead of JSON
    pub use_pretty_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level_filter: DEFAULT_LOG_LEVEL.to_string(),
            use_pretty_format: false,
        }
    }
}

impl LoggingConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT`.
    pub fn from_env() -> Self {
        let level_filter = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let use_pretty_format = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("pretty"))
            .unwrap_or(false);

        Self {
            level_filter,
            use_pretty_format,
        }
    }
}

/// Initialize logging from the environment. Subsequent calls are no-ops.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::from_env());
}

pub fn init_logging_with_config(config: LoggingConfig) {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let env_filter = EnvFilter::try_new(&config.level_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if config.use_pretty_format {
        tracing_subscriber::registry()
            .with(
                ts_fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                ts_fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true)
                    .with_current_span(true),
            )
            .with(env_filter)
            .init();
    }
}

/// Test subscriber writing through the test harness; double init is ignored.
#[cfg(test)]
pub fn init_test_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
