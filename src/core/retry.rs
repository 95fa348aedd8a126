//! Bounded retry with auto-rebalance
//!
//! Failed attempts back off linearly (`base_delay × attempt`). When the
//! error carries an insufficient-balance signature and a rebalance hook is
//! available, the hook runs instead, followed by a short settling wait.
//! After the last attempt the last error is returned unchanged.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::constants;
use crate::error::{AppError, Result};

/// Something that can even out collateral before an order is retried
#[async_trait]
pub trait RebalanceHook: Send + Sync {
    async fn rebalance(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Wait after a successful rebalance before the next attempt
    pub rebalance_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            rebalance_wait: constants::rebalance_settle_delay(),
        }
    }

    /// Order placement and closing
    pub fn orders() -> Self {
        Self::new(constants::max_retry_attempts(), constants::retry_base_delay())
    }

    /// Pre-open position cleanup
    pub fn cleanup() -> Self {
        Self::new(constants::cleanup_retry_attempts(), constants::cleanup_retry_delay())
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::orders()
    }
}

/// Run `operation` up to `policy.max_attempts` times.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    hook: Option<&dyn RebalanceHook>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        if attempt > 1 {
            tracing::info!(label = %label, attempt, max = policy.max_attempts, "[RETRY] Retrying");
        }

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(label = %label, attempt, "[RETRY] Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        tracing::warn!(label = %label, attempt, max = policy.max_attempts, error = %error, "[RETRY] Attempt failed");
        if attempt >= policy.max_attempts {
            tracing::error!(label = %label, attempts = attempt, error = %error, "[RETRY] All attempts failed");
            return Err(error);
        }

        if try_rebalance(policy, label, hook, &error).await {
            attempt += 1;
            continue;
        }

        let wait = policy.backoff(attempt);
        tracing::debug!(label = %label, wait_ms = wait.as_millis() as u64, "[RETRY] Backing off");
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

/// True when a rebalance ran and the settling wait elapsed
async fn try_rebalance(policy: &RetryPolicy, label: &str, hook: Option<&dyn RebalanceHook>, error: &AppError) -> bool {
    let Some(hook) = hook else {
        return false;
    };
    if !error.is_balance_error() {
        return false;
    }

    tracing::info!(label = %label, "[RETRY] Balance error detected, rebalancing before retry");
    match hook.rebalance().await {
        Ok(()) => {
            tokio::time::sleep(policy.rebalance_wait).await;
            true
        }
        Err(e) => {
            tracing::warn!(label = %label, error = %e, "[RETRY] Rebalance failed, falling back to backoff");
            false
        }
    }
}
