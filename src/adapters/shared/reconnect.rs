//! Reconnection with exponential backoff
//!
//! Delay before attempt `n` (1-based) is `initial × 2^(n-1)`, capped at
//! `max_delay_ms`.

use std::time::Duration;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::config::constants;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    /// Delay before the first attempt, doubled for each following one
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::ws_max_reconnect_attempts(),
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Backoff before 1-based attempt `attempt`
pub fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let ms = config
        .initial_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_delay_ms);
    Duration::from_millis(ms)
}

/// Retry `connect_fn` until it succeeds or `max_attempts` is reached,
/// returning the last error.
pub async fn reconnect_with_backoff<T, F, Fut>(
    config: &ReconnectConfig,
    name: &str,
    mut connect_fn: F,
) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ExchangeResult<T>>,
{
    let mut last_error: Option<ExchangeError> = None;

    for attempt in 1..=config.max_attempts {
        let delay = backoff_delay(config, attempt);
        tracing::info!(
            "{}: Reconnect attempt {} of {}, waiting {}ms...",
            name,
            attempt,
            config.max_attempts,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;

        match connect_fn().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!("{}: Reconnect attempt {} failed: {}", name, attempt, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ExchangeError::ConnectionFailed("Reconnection failed after max attempts".into())
    }))
}
