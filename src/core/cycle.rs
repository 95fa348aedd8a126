//! Delta-neutral cycle orchestrator
//!
//! One [`BotSession`] per user drives the two-account loop:
//!
//! ```text
//! idle → rebalancing → verifying_balance → cleaning_positions
//!      → opening_both → holding → closing_both → idle
//! ```
//!
//! Any failed step moves to `error_backoff`. The persisted `bot_running`
//! flag is the stop signal; it is read before every iteration and around
//! the hold. A [`CancellationToken`] additionally ends the loop on process
//! shutdown.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::adapters::extended::OrderRequest;
use crate::adapters::store::StatusStore;
use crate::adapters::types::OrderSide;
use crate::config::{constants, CycleConfig, UserConfig};
use crate::core::rebalance::{PairRebalance, Rebalancer};
use crate::core::retry::{retry, RetryPolicy};
use crate::core::session::{AccountPair, TradingAccount};
use crate::core::trading::AccountOps;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Rebalancing,
    VerifyingBalance,
    CleaningPositions,
    OpeningBoth,
    Holding,
    ClosingBoth,
    ErrorBackoff,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleState::Idle => "idle",
            CycleState::Rebalancing => "rebalancing",
            CycleState::VerifyingBalance => "verifying_balance",
            CycleState::CleaningPositions => "cleaning_positions",
            CycleState::OpeningBoth => "opening_both",
            CycleState::Holding => "holding",
            CycleState::ClosingBoth => "closing_both",
            CycleState::ErrorBackoff => "error_backoff",
        })
    }
}

/// How one pass through the state machine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Both legs opened, held and closed
    Completed,
    /// The initial rebalance failed; nothing was traded
    Skipped,
    /// Only one leg opened and was unwound
    Aborted,
    /// The liveness flag or shutdown ended the iteration
    Stopped,
}

/// Pauses between steps
#[derive(Debug, Clone)]
pub struct CycleTimings {
    pub pre_cycle: Duration,
    pub post_rebalance: Duration,
    pub step_settle: Duration,
    pub restart: Duration,
    pub abort: Duration,
    pub error_backoff: Duration,
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self {
            pre_cycle: constants::pre_cycle_delay(),
            post_rebalance: constants::post_rebalance_delay(),
            step_settle: constants::step_settle_delay(),
            restart: constants::cycle_restart_delay(),
            abort: constants::cycle_abort_delay(),
            error_backoff: constants::error_backoff_delay(),
        }
    }
}

pub struct BotSession {
    user: UserConfig,
    pair: AccountPair,
    config: CycleConfig,
    status: Arc<dyn StatusStore>,
    ops: AccountOps,
    rebalancer: Rebalancer,
    timings: CycleTimings,
    order_policy: RetryPolicy,
    cleanup_policy: RetryPolicy,
    state: watch::Sender<CycleState>,
    completed: AtomicU64,
}

impl BotSession {
    pub fn new(
        user: UserConfig,
        pair: AccountPair,
        config: CycleConfig,
        status: Arc<dyn StatusStore>,
        ops: AccountOps,
        rebalancer: Rebalancer,
    ) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            user,
            pair,
            config,
            status,
            ops,
            rebalancer,
            timings: CycleTimings::default(),
            order_policy: RetryPolicy::orders(),
            cleanup_policy: RetryPolicy::cleanup(),
            state,
            completed: AtomicU64::new(0),
        }
    }

    pub fn with_timings(mut self, timings: CycleTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn enter(&self, state: CycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "[CYCLE] State transition");
        }
    }

    fn hook(&self) -> PairRebalance<'_> {
        PairRebalance {
            rebalancer: &self.rebalancer,
            pair: &self.pair,
        }
    }

    /// Persisted liveness; an unreadable flag counts as stopped
    async fn is_alive(&self) -> bool {
        match self.status.is_running(&self.user.user_id, &self.user.wallet_address).await {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(error = %e, "[CYCLE] Could not read bot status, treating as stopped");
                false
            }
        }
    }

    /// Run cycles until the liveness flag clears or `shutdown` fires, then
    /// persist the stopped status. Returns the number of completed cycles.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<u64> {
        tracing::info!(
            market = %self.config.market,
            leverage = self.config.leverage,
            hold_minutes = self.config.hold_minutes,
            "[CYCLE] Bot loop started"
        );

        loop {
            if !pause(&shutdown, self.timings.pre_cycle).await {
                break;
            }
            if !self.is_alive().await {
                tracing::info!("[CYCLE] Bot status is stopped, leaving loop");
                break;
            }

            match self.run_iteration(&shutdown).await {
                Ok(IterationOutcome::Completed) => {
                    self.enter(CycleState::Idle);
                    if !pause(&shutdown, self.timings.restart).await {
                        break;
                    }
                }
                Ok(IterationOutcome::Skipped) => self.enter(CycleState::Idle),
                Ok(IterationOutcome::Aborted) => {
                    self.enter(CycleState::ErrorBackoff);
                    if !pause(&shutdown, self.timings.abort).await {
                        break;
                    }
                    self.enter(CycleState::Idle);
                }
                Ok(IterationOutcome::Stopped) => break,
                Err(e) => {
                    tracing::error!(
                        market = %self.config.market,
                        state = %self.state(),
                        error = %e,
                        "[CYCLE] Iteration failed, backing off"
                    );
                    self.enter(CycleState::ErrorBackoff);
                    if !pause(&shutdown, self.timings.error_backoff).await {
                        break;
                    }
                    self.enter(CycleState::Idle);
                }
            }
        }

        self.enter(CycleState::Idle);
        if let Err(e) = self
            .status
            .set_running(&self.user.user_id, &self.user.wallet_address, false)
            .await
        {
            tracing::warn!(error = %e, "[CYCLE] Could not persist stopped status");
        }

        let completed = self.completed_cycles();
        tracing::info!(completed, "[CYCLE] Bot loop stopped");
        Ok(completed)
    }

    /// One pass from rebalancing to closing both legs
    pub async fn run_iteration(&self, shutdown: &CancellationToken) -> Result<IterationOutcome> {
        let cycle = self.completed_cycles() + 1;
        let market = self.config.market.as_str();

        self.enter(CycleState::Rebalancing);
        if let Err(e) = self.rebalancer.rebalance(&self.pair).await {
            tracing::warn!(cycle, error = %e, "[CYCLE] Rebalance failed, skipping iteration");
            return Ok(IterationOutcome::Skipped);
        }
        tokio::time::sleep(self.timings.post_rebalance).await;

        self.enter(CycleState::VerifyingBalance);
        self.verify_balances().await?;

        self.enter(CycleState::CleaningPositions);
        let (a, b) = tokio::join!(
            self.close_side(&self.pair.a, &self.cleanup_policy),
            self.close_side(&self.pair.b, &self.cleanup_policy),
        );
        for (account, result) in [(&self.pair.a, a), (&self.pair.b, b)] {
            if let Err(e) = result {
                tracing::debug!(account = %account.label(), error = %e, "[CYCLE] Cleanup incomplete");
            }
        }

        tokio::time::sleep(self.timings.step_settle).await;
        if let Err(e) = self.rebalancer.rebalance(&self.pair).await {
            tracing::warn!(cycle, error = %e, "[CYCLE] Pre-open rebalance failed");
        }
        tokio::time::sleep(self.timings.step_settle).await;

        self.enter(CycleState::OpeningBoth);
        let (long, short) = tokio::join!(
            self.open_side(&self.pair.a, OrderSide::Buy),
            self.open_side(&self.pair.b, OrderSide::Sell),
        );

        match (long, short) {
            (Ok(_), Ok(_)) => {
                tracing::info!(cycle, market = %market, "[CYCLE] Both legs opened");
            }
            (Err(long_err), Err(short_err)) => {
                tracing::error!(
                    cycle,
                    long_error = %long_err,
                    short_error = %short_err,
                    "[CYCLE] Both legs failed to open"
                );
                return Err(long_err);
            }
            (Ok(_), Err(e)) => return Ok(self.unwind(&self.pair.a, OrderSide::Buy, e).await),
            (Err(e), Ok(_)) => return Ok(self.unwind(&self.pair.b, OrderSide::Sell, e).await),
        }

        self.enter(CycleState::Holding);
        let mut stopped = !self.is_alive().await;
        if stopped {
            tracing::info!(cycle, "[CYCLE] Stop requested before hold, closing now");
        } else {
            let hold = Duration::from_secs(self.config.hold_minutes * 60);
            tracing::info!(cycle, hold_minutes = self.config.hold_minutes, "[CYCLE] Holding positions");
            if !pause(shutdown, hold).await {
                tracing::info!(cycle, "[CYCLE] Shutdown during hold, closing now");
                stopped = true;
            } else if !self.is_alive().await {
                tracing::info!(cycle, "[CYCLE] Stop requested during hold, closing now");
                stopped = true;
            }
        }

        self.enter(CycleState::ClosingBoth);
        let (a, b) = tokio::join!(
            self.close_side(&self.pair.a, &self.order_policy),
            self.close_side(&self.pair.b, &self.order_policy),
        );
        for (account, result) in [(&self.pair.a, a), (&self.pair.b, b)] {
            if let Err(e) = result {
                tracing::error!(
                    cycle,
                    account = %account.label(),
                    market = %market,
                    error = %e,
                    "[CYCLE] Close failed, position may remain open"
                );
            }
        }

        self.completed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(cycle, market = %market, "[CYCLE] Cycle completed");

        Ok(if stopped {
            IterationOutcome::Stopped
        } else {
            IterationOutcome::Completed
        })
    }

    async fn verify_balances(&self) -> Result<()> {
        let (a, b) = tokio::try_join!(self.ops.balance(&self.pair.a), self.ops.balance(&self.pair.b))?;
        let min = self.config.min_balance_usdc;
        for (account, balance) in [(&self.pair.a, a), (&self.pair.b, b)] {
            if balance.available_for_trade < min {
                return Err(AppError::Validation(format!(
                    "Insufficient balance on {}: {} available, {} required",
                    account.label(),
                    balance.available_for_trade,
                    min
                )));
            }
        }
        Ok(())
    }

    async fn open_side(&self, account: &TradingAccount, side: OrderSide) -> Result<()> {
        let request = OrderRequest::market(&self.config.market, side, None)
            .with_leverage(self.config.leverage)
            .with_slippage(self.config.slippage_bps);
        let request = &request;
        let hook = self.hook();
        let label = format!("open {} {}", side, account.label());

        retry(&self.order_policy, &label, Some(&hook), move || async move {
            self.ops.open_market_order(account, request).await.into_result()
        })
        .await
        .map(|_| ())
    }

    async fn close_side(&self, account: &TradingAccount, policy: &RetryPolicy) -> Result<()> {
        let hook = self.hook();
        self.ops
            .close_positions(account, &self.config.market, policy, Some(&hook))
            .await
            .map(|_| ())
    }

    /// Close the only leg that opened so no unhedged exposure remains
    async fn unwind(&self, opened: &TradingAccount, side: OrderSide, cause: AppError) -> IterationOutcome {
        tracing::warn!(
            account = %opened.label(),
            side = %side,
            error = %cause,
            "[CYCLE] One leg failed, closing the other"
        );
        self.enter(CycleState::ClosingBoth);
        if let Err(e) = self.close_side(opened, &self.order_policy).await {
            tracing::error!(
                account = %opened.label(),
                market = %self.config.market,
                error = %e,
                "[CYCLE] Could not unwind one-sided position"
            );
        }
        IterationOutcome::Aborted
    }
}

/// Sleep unless `shutdown` fires first; false when cancelled
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
