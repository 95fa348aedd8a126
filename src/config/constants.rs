//! Timing and protocol constants
//!
//! Every value can be overridden through the environment variable named in
//! its doc comment. Defaults match the exchange-facing behavior the bot has
//! always had.

use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(key, default_ms))
}

// =============================================================================
// Retry
// =============================================================================

/// Attempts for order placement and closing (default: 3)
///
/// Environment variable: `MAX_RETRY_ATTEMPTS`
pub fn max_retry_attempts() -> u32 {
    env_or("MAX_RETRY_ATTEMPTS", 3)
}

/// Linear backoff unit between attempts (default: 1000ms)
///
/// Environment variable: `RETRY_BASE_DELAY_MS`
pub fn retry_base_delay() -> Duration {
    env_millis("RETRY_BASE_DELAY_MS", 1000)
}

/// Attempts for the pre-open position cleanup (default: 2)
///
/// Environment variable: `CLEANUP_RETRY_ATTEMPTS`
pub fn cleanup_retry_attempts() -> u32 {
    env_or("CLEANUP_RETRY_ATTEMPTS", 2)
}

/// Environment variable: `CLEANUP_RETRY_DELAY_MS` (default: 1500ms)
pub fn cleanup_retry_delay() -> Duration {
    env_millis("CLEANUP_RETRY_DELAY_MS", 1500)
}

// =============================================================================
// Cycle Timings
// =============================================================================

/// Wait after a transfer before balances are re-read (default: 2s)
///
/// Environment variable: `REBALANCE_SETTLE_DELAY_MS`
pub fn rebalance_settle_delay() -> Duration {
    env_millis("REBALANCE_SETTLE_DELAY_MS", 2000)
}

/// Wait between the rebalance step and balance verification (default: 3s)
///
/// Environment variable: `POST_REBALANCE_DELAY_MS`
pub fn post_rebalance_delay() -> Duration {
    env_millis("POST_REBALANCE_DELAY_MS", 3000)
}

/// Settling pause between cleanup, rebalance and open (default: 2s)
///
/// Environment variable: `STEP_SETTLE_DELAY_MS`
pub fn step_settle_delay() -> Duration {
    env_millis("STEP_SETTLE_DELAY_MS", 2000)
}

/// Pause before each liveness check (default: 2s)
///
/// Environment variable: `PRE_CYCLE_DELAY_MS`
pub fn pre_cycle_delay() -> Duration {
    env_millis("PRE_CYCLE_DELAY_MS", 2000)
}

/// Pause between two complete cycles (default: 1s)
///
/// Environment variable: `CYCLE_RESTART_DELAY_MS`
pub fn cycle_restart_delay() -> Duration {
    env_millis("CYCLE_RESTART_DELAY_MS", 1000)
}

/// Pause after a one-sided open was unwound (default: 5s)
///
/// Environment variable: `CYCLE_ABORT_DELAY_MS`
pub fn cycle_abort_delay() -> Duration {
    env_millis("CYCLE_ABORT_DELAY_MS", 5000)
}

/// Back-off after a failed iteration (default: 30s)
///
/// Environment variable: `ERROR_BACKOFF_DELAY_MS`
pub fn error_backoff_delay() -> Duration {
    env_millis("ERROR_BACKOFF_DELAY_MS", 30_000)
}

/// Pause between two reduce-only closes on the same account (default: 1s)
///
/// Environment variable: `CLOSE_PAUSE_MS`
pub fn close_pause() -> Duration {
    env_millis("CLOSE_PAUSE_MS", 1000)
}

// =============================================================================
// Network
// =============================================================================

/// Bound on one-shot WebSocket snapshots (default: 5s)
///
/// Environment variable: `WS_SNAPSHOT_TIMEOUT_MS`
pub fn ws_snapshot_timeout() -> Duration {
    env_millis("WS_SNAPSHOT_TIMEOUT_MS", 5000)
}

/// Reconnect attempts of the streaming price feed (default: 5)
///
/// Environment variable: `WS_MAX_RECONNECT_ATTEMPTS`
pub fn ws_max_reconnect_attempts() -> u32 {
    env_or("WS_MAX_RECONNECT_ATTEMPTS", 5)
}

/// HTTP request timeout (default: 15s)
///
/// Environment variable: `REQUEST_TIMEOUT_MS`
pub fn request_timeout() -> Duration {
    env_millis("REQUEST_TIMEOUT_MS", 15_000)
}

/// Order and transfer validity window (default: 1h)
///
/// Environment variable: `ORDER_EXPIRY_SECS`
pub fn order_expiry() -> Duration {
    Duration::from_secs(env_or("ORDER_EXPIRY_SECS", 3600))
}

/// User-Agent sent to the Extended API
///
/// Environment variable: `EXTENDED_USER_AGENT`
pub fn user_agent() -> String {
    std::env::var("EXTENDED_USER_AGENT").unwrap_or_else(|_| "DroidHL_BASED/1.0".to_string())
}

/// Print all configuration values at startup
pub fn log_configuration() {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Retry:");
    tracing::info!("  - Max attempts: {}", max_retry_attempts());
    tracing::info!("  - Base delay: {:?}", retry_base_delay());
    tracing::info!("  - Cleanup attempts: {} ({:?})", cleanup_retry_attempts(), cleanup_retry_delay());

    tracing::info!("Cycle:");
    tracing::info!("  - Rebalance settle: {:?}", rebalance_settle_delay());
    tracing::info!("  - Post-rebalance: {:?}", post_rebalance_delay());
    tracing::info!("  - Step settle: {:?}", step_settle_delay());
    tracing::info!("  - Restart: {:?} / abort: {:?}", cycle_restart_delay(), cycle_abort_delay());
    tracing::info!("  - Error backoff: {:?}", error_backoff_delay());

    tracing::info!("Network:");
    tracing::info!("  - Request timeout: {:?}", request_timeout());
    tracing::info!("  - WS snapshot timeout: {:?}", ws_snapshot_timeout());
    tracing::info!("  - Order expiry: {:?}", order_expiry());
    tracing::info!("==================================");
}
