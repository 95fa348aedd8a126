//! Randomized micro-cycles on Hyperliquid
//!
//! Available USDC is split into independent budget cycles. Each cycle runs
//! in its own task: wait a random delay, buy, hold until a random deadline
//! or a large enough price move, sell, fold the realized PnL into its
//! budget and start over. A cycle completes once its budget is gone.
//!
//! Stopping flips the running flag, cancels the shared token and aborts
//! every cycle task, so no scheduled step acts after [`Humanizer::stop`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::hyperliquid::place_ioc_with_fallback;
use crate::adapters::traits::MicroVenue;
use crate::adapters::types::OrderSide;
use crate::config::HumanizerConfig;
use crate::error::{AppError, Result};

/// Below this the venue balance or a cycle budget cannot place an order
pub const MIN_ORDER_USDC: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Waiting,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingCycle {
    pub number: u32,
    pub budget: Decimal,
    /// Budget plus realized PnL so far
    pub remaining: Decimal,
    pub status: CycleStatus,
    pub side: Option<OrderSide>,
    pub entry_price: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    /// USDC committed by the open buy
    pub amount: Decimal,
}

impl TradingCycle {
    fn new(number: u32, budget: Decimal) -> Self {
        Self {
            number,
            budget,
            remaining: budget,
            status: CycleStatus::Waiting,
            side: None,
            entry_price: None,
            entry_time: None,
            amount: Decimal::ZERO,
        }
    }
}

/// `floor(balance / budget)` capped at `max_cycles`
pub fn cycle_count(balance: Decimal, budget: Decimal, max_cycles: u32) -> Result<u32> {
    if budget <= Decimal::ZERO {
        return Err(AppError::Validation("Budget per cycle must be > 0".into()));
    }
    let count = (balance / budget).floor().to_u32().unwrap_or(u32::MAX).min(max_cycles);
    if count == 0 {
        return Err(AppError::Validation(format!(
            "Insufficient balance: {} USDC for a {} USDC cycle",
            balance, budget
        )));
    }
    Ok(count)
}

/// Delay before a buy or sell.
///
/// `0/0` picks 1-5 s, equal bounds are a fixed number of minutes, anything
/// else is uniform between the bounds.
pub fn random_delay<R: Rng>(rng: &mut R, min_minutes: u64, max_minutes: u64) -> Duration {
    if min_minutes == 0 && max_minutes == 0 {
        return Duration::from_secs(rng.gen_range(1..=5));
    }
    if min_minutes >= max_minutes {
        return Duration::from_secs(min_minutes * 60);
    }
    Duration::from_secs(rng.gen_range(min_minutes * 60..=max_minutes * 60))
}

/// Size bought or sold with `amount` USDC, rounded down to the size precision
pub fn order_size(amount: Decimal, price: Decimal, sz_decimals: u32) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    let size = amount
        .checked_div(price)?
        .round_dp_with_strategy(sz_decimals, RoundingStrategy::ToZero);
    (size > Decimal::ZERO).then_some(size)
}

/// Percentage move of `price` away from `entry`
pub fn variation_pct(entry: Decimal, price: Decimal) -> Decimal {
    if entry <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (price - entry).abs() / entry * Decimal::ONE_HUNDRED
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum BuyResult {
    Bought { price: Decimal, amount: Decimal },
    Retry,
    StopAll,
}

pub struct Humanizer {
    venue: Arc<dyn MicroVenue>,
    config: HumanizerConfig,
    cycles: Mutex<HashMap<u32, TradingCycle>>,
    tasks: Mutex<HashMap<u32, JoinHandle<()>>>,
    running: AtomicBool,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl Humanizer {
    pub fn new(venue: Arc<dyn MicroVenue>, config: HumanizerConfig, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            venue,
            config,
            cycles: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn cycles(&self) -> Vec<TradingCycle> {
        let mut cycles: Vec<_> = lock(&self.cycles).values().cloned().collect();
        cycles.sort_by_key(|c| c.number);
        cycles
    }

    /// Split the venue balance into cycles and start one task per cycle
    pub async fn start(self: &Arc<Self>) -> Result<u32> {
        let balance = self.venue.usdc_balance().await?;
        let count = cycle_count(balance, self.config.budget_per_cycle, self.config.max_cycles)?;

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            coin = %self.config.coin,
            balance = %balance,
            budget = %self.config.budget_per_cycle,
            cycles = count,
            "[HUMANIZER] Starting"
        );

        for number in 1..=count {
            lock(&self.cycles).insert(number, TradingCycle::new(number, self.config.budget_per_cycle));
            let handle = tokio::spawn(Arc::clone(self).run_cycle(number));
            lock(&self.tasks).insert(number, handle);
        }
        Ok(count)
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        for (_, handle) in lock(&self.tasks).drain() {
            handle.abort();
        }
        lock(&self.cycles).clear();
        tracing::info!("[HUMANIZER] Stopped, pending cycles cancelled");
    }

    /// Every cycle completed: release whoever waits on the token, keep the table
    fn finish(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        tracing::info!("[HUMANIZER] All cycles completed");
    }

    /// Wait for `duration`; false once stopped
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => self.is_running(),
        }
    }

    fn next_delay(&self) -> Duration {
        random_delay(
            &mut rand::thread_rng(),
            self.config.holding_min_minutes,
            self.config.holding_max_minutes,
        )
    }

    fn update(&self, number: u32, f: impl FnOnce(&mut TradingCycle)) -> Option<TradingCycle> {
        let mut cycles = lock(&self.cycles);
        let cycle = cycles.get_mut(&number)?;
        f(cycle);
        Some(cycle.clone())
    }

    async fn run_cycle(self: Arc<Self>, number: u32) {
        loop {
            if !self.wait(self.next_delay()).await {
                return;
            }

            let (entry, amount) = match self.buy(number).await {
                BuyResult::Bought { price, amount } => (price, amount),
                BuyResult::Retry => continue,
                BuyResult::StopAll => {
                    self.stop();
                    return;
                }
            };

            let Some(exit) = self.hold_and_sell(number, entry, amount).await else {
                return;
            };

            let size = order_size(amount, exit, self.config.sz_decimals).unwrap_or(Decimal::ZERO);
            let profit = (exit - entry) * size;
            let Some(cycle) = self.update(number, |c| {
                c.remaining += profit;
                c.side = None;
                c.entry_price = None;
                c.entry_time = None;
                c.amount = Decimal::ZERO;
                c.status = if c.remaining > Decimal::ZERO {
                    CycleStatus::Waiting
                } else {
                    CycleStatus::Completed
                };
            }) else {
                return;
            };

            tracing::info!(
                cycle = number,
                entry = %entry,
                exit = %exit,
                profit = %profit,
                remaining = %cycle.remaining,
                "[HUMANIZER] Round trip closed"
            );

            if cycle.status == CycleStatus::Completed {
                tracing::info!(cycle = number, "[HUMANIZER] Budget exhausted, cycle completed");
                let last = {
                    let mut tasks = lock(&self.tasks);
                    tasks.remove(&number);
                    tasks.is_empty()
                };
                if last {
                    self.finish();
                }
                return;
            }
        }
    }

    async fn buy(&self, number: u32) -> BuyResult {
        let usdc = match self.venue.usdc_balance().await {
            Ok(usdc) => usdc,
            Err(e) => {
                tracing::warn!(cycle = number, error = %e, "[HUMANIZER] Balance unavailable, retrying later");
                return BuyResult::Retry;
            }
        };
        let Some(remaining) = lock(&self.cycles).get(&number).map(|c| c.remaining) else {
            return BuyResult::Retry;
        };

        let amount = remaining.min(usdc);
        if usdc < MIN_ORDER_USDC || amount < MIN_ORDER_USDC {
            tracing::warn!(
                cycle = number,
                usdc = %usdc,
                remaining = %remaining,
                "[HUMANIZER] Balance below minimum order, stopping"
            );
            return BuyResult::StopAll;
        }

        let Some(book) = self.venue.book().await else {
            tracing::warn!(cycle = number, "[HUMANIZER] No book yet, retrying later");
            return BuyResult::Retry;
        };
        let Some(size) = order_size(amount, book.ask, self.config.sz_decimals) else {
            return BuyResult::Retry;
        };

        if !place_ioc_with_fallback(self.venue.as_ref(), book.ask, size, true).await {
            return BuyResult::Retry;
        }

        self.update(number, |c| {
            c.status = CycleStatus::Active;
            c.side = Some(OrderSide::Buy);
            c.entry_price = Some(book.ask);
            c.entry_time = Some(Utc::now());
            c.amount = amount;
        });
        tracing::info!(cycle = number, price = %book.ask, size = %size, amount = %amount, "[HUMANIZER] Bought");
        BuyResult::Bought {
            price: book.ask,
            amount,
        }
    }

    /// Sell at the deadline or on a large move; returns the exit price.
    /// `None` when stopped first.
    async fn hold_and_sell(&self, number: u32, entry: Decimal, amount: Decimal) -> Option<Decimal> {
        let deadline = tokio::time::Instant::now() + self.next_delay();
        loop {
            let now = tokio::time::Instant::now();
            let due = now >= deadline;
            if !due && !self.wait(self.poll_interval.min(deadline - now)).await {
                return None;
            }
            if !self.is_running() {
                return None;
            }

            let bid = self.venue.book().await.map(|b| b.bid).filter(|b| *b > Decimal::ZERO);
            let moved = bid.is_some_and(|b| variation_pct(entry, b) >= self.config.max_variation_pct);
            if !(due || moved || tokio::time::Instant::now() >= deadline) {
                continue;
            }

            let Some(price) = bid else {
                tracing::warn!(cycle = number, "[HUMANIZER] No bid to sell into, waiting");
                if !self.wait(self.poll_interval).await {
                    return None;
                }
                continue;
            };
            let Some(size) = order_size(amount, price, self.config.sz_decimals) else {
                return Some(price);
            };

            if moved {
                tracing::info!(cycle = number, entry = %entry, bid = %price, "[HUMANIZER] Price moved, selling early");
            }
            if place_ioc_with_fallback(self.venue.as_ref(), price, size, false).await {
                return Some(price);
            }
            if !self.wait(self.poll_interval).await {
                return None;
            }
        }
    }
}
