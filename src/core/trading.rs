//! Per-account trading operations
//!
//! Opening a sized market order, flattening every position of a market and
//! reading account state. Order failures are reported as an
//! [`OrderOutcome`] so the cycle can tell one-sided opens apart.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::adapters::extended::{OrderBuilder, OrderRequest, SigningOracle};
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::{Balance, OpenOrder, OrderAck, Position, SignedOrder};
use crate::config::constants;
use crate::core::retry::{retry, RebalanceHook, RetryPolicy};
use crate::core::session::TradingAccount;
use crate::core::sizing::MaxSizeCalculator;
use crate::error::{AppError, Result};

/// Result of one order submission
#[derive(Debug)]
pub enum OrderOutcome {
    Placed { ack: OrderAck, order: SignedOrder },
    Failed { error: AppError },
}

impl OrderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OrderOutcome::Placed { .. })
    }

    pub fn into_result(self) -> Result<OrderAck> {
        match self {
            OrderOutcome::Placed { ack, .. } => Ok(ack),
            OrderOutcome::Failed { error } => Err(error),
        }
    }
}

/// Orders, positions and balance read at the same moment
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub orders: Vec<OpenOrder>,
    pub positions: Vec<Position>,
    pub balance: Balance,
    pub timestamp: DateTime<Utc>,
}

pub struct AccountOps {
    api: Arc<dyn ExtendedApi>,
    builder: OrderBuilder,
    sizer: MaxSizeCalculator,
    close_pause: Duration,
}

impl AccountOps {
    pub fn new(api: Arc<dyn ExtendedApi>, oracle: Arc<dyn SigningOracle>) -> Self {
        Self {
            builder: OrderBuilder::new(Arc::clone(&api), oracle),
            sizer: MaxSizeCalculator::new(Arc::clone(&api)),
            api,
            close_pause: constants::close_pause(),
        }
    }

    pub fn with_close_pause(mut self, pause: Duration) -> Self {
        self.close_pause = pause;
        self
    }

    /// Place a market order; an unsized request commits the max size at
    /// the requested leverage.
    pub async fn open_market_order(&self, account: &TradingAccount, request: &OrderRequest) -> OrderOutcome {
        match self.place(account, request).await {
            Ok((ack, order)) => {
                tracing::info!(
                    account = %account.label(),
                    market = %order.market,
                    side = %order.side,
                    qty = %order.qty,
                    price = %order.price,
                    reduce_only = order.reduce_only,
                    order_id = %ack.id,
                    "[ORDER] Placed"
                );
                OrderOutcome::Placed { ack, order }
            }
            Err(error) => {
                tracing::warn!(
                    account = %account.label(),
                    market = %request.market,
                    side = %request.side,
                    error = %error,
                    "[ORDER] Rejected"
                );
                OrderOutcome::Failed { error }
            }
        }
    }

    async fn place(&self, account: &TradingAccount, request: &OrderRequest) -> Result<(OrderAck, SignedOrder)> {
        if !request.reduce_only {
            match self.api.set_leverage(&account.creds, &request.market, request.leverage).await {
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    account = %account.label(),
                    leverage = request.leverage,
                    error = %e,
                    "[ORDER] Could not set leverage, keeping current"
                ),
            }
        }

        let mut request = request.clone();
        if request.size.is_none() {
            let max = self
                .sizer
                .max_size(&account.creds, &request.market, request.side, request.leverage)
                .await?;
            request.size = Some(max.size);
        }

        let order = self.builder.build(&account.creds, account.vault_id, &request).await?;
        let ack = self.api.submit_order(&account.creds, &order).await?;
        Ok((ack, order))
    }

    /// Flatten every position of `market` with reduce-only orders.
    ///
    /// All positions are attempted; the last failure is returned.
    pub async fn close_positions(
        &self,
        account: &TradingAccount,
        market: &str,
        policy: &RetryPolicy,
        hook: Option<&dyn RebalanceHook>,
    ) -> Result<Vec<OrderAck>> {
        let positions: Vec<Position> = self
            .positions(account)
            .await?
            .into_iter()
            .filter(|p| p.market == market && p.size > Decimal::ZERO)
            .collect();

        if positions.is_empty() {
            tracing::debug!(account = %account.label(), market = %market, "[CLOSE] Nothing to close");
            return Ok(Vec::new());
        }

        let mut acks = Vec::with_capacity(positions.len());
        let mut last_error = None;
        for (i, position) in positions.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.close_pause).await;
            }

            let request = OrderRequest::market(market, position.side.closing_side(), Some(position.size)).reduce_only();
            let request = &request;
            let label = format!("close {} {}", account.label(), market);
            match retry(policy, &label, hook, move || async move {
                self.open_market_order(account, request).await.into_result()
            })
            .await
            {
                Ok(ack) => acks.push(ack),
                Err(e) => {
                    tracing::error!(
                        account = %account.label(),
                        market = %market,
                        size = %position.size,
                        error = %e,
                        "[CLOSE] Position could not be closed"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(account = %account.label(), market = %market, closed = acks.len(), "[CLOSE] Positions closed");
                Ok(acks)
            }
        }
    }

    pub async fn balance(&self, account: &TradingAccount) -> Result<Balance> {
        self.api.balance(&account.creds).await
    }

    pub async fn positions(&self, account: &TradingAccount) -> Result<Vec<Position>> {
        self.api.positions(&account.creds).await
    }

    pub async fn snapshot(&self, account: &TradingAccount) -> Result<AccountSnapshot> {
        let (orders, positions, balance) = tokio::try_join!(
            self.api.open_orders(&account.creds),
            self.api.positions(&account.creds),
            self.api.balance(&account.creds),
        )?;
        Ok(AccountSnapshot {
            orders,
            positions,
            balance,
            timestamp: Utc::now(),
        })
    }
}
