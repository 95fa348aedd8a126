//! Balance-rebalancing engine
//!
//! Keeps the two sub-accounts of a pair at a 50/50 split of
//! available-for-trade collateral. A transfer only happens when the
//! difference clears both floors:
//! - absolute: `|a − b| ≥ 2 × min_transfer_amount` (half of it moves)
//! - relative: `|a − b| / (a + b) × 100 ≥ min_imbalance_pct`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::adapters::extended::{SigningOracle, TransferBuilder};
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::TransferRequest;
use crate::config::{constants, RebalanceConfig};
use crate::core::numeric::format_ratio;
use crate::core::retry::RebalanceHook;
use crate::core::session::{AccountPair, TradingAccount};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceAction {
    NoAction,
    TransferAToB,
    TransferBToA,
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RebalanceAction::NoAction => "no_action",
            RebalanceAction::TransferAToB => "transfer_A_to_B",
            RebalanceAction::TransferBToA => "transfer_B_to_A",
        })
    }
}

/// Available-for-trade of both accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairBalances {
    pub a: Decimal,
    pub b: Decimal,
}

impl PairBalances {
    pub fn total(&self) -> Decimal {
        self.a + self.b
    }

    pub fn difference(&self) -> Decimal {
        (self.a - self.b).abs()
    }

    /// Difference as a percentage of the total, zero for empty accounts
    pub fn imbalance_pct(&self) -> Decimal {
        let total = self.total();
        if total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.difference() / total * Decimal::ONE_HUNDRED
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePlan {
    pub action: RebalanceAction,
    pub amount: Decimal,
}

/// Decide the transfer needed to reach 50/50
pub fn plan_rebalance(balances: PairBalances, config: &RebalanceConfig) -> RebalancePlan {
    let none = RebalancePlan {
        action: RebalanceAction::NoAction,
        amount: Decimal::ZERO,
    };

    let difference = balances.difference();
    if difference < config.min_transfer_amount * Decimal::TWO || balances.imbalance_pct() < config.min_imbalance_pct {
        return none;
    }
    if balances.a.is_zero() && balances.b.is_zero() {
        return none;
    }

    RebalancePlan {
        action: if balances.a > balances.b {
            RebalanceAction::TransferAToB
        } else {
            RebalanceAction::TransferBToA
        },
        amount: difference / Decimal::TWO,
    }
}

#[derive(Debug, Clone)]
pub struct RebalanceResult {
    pub action: RebalanceAction,
    pub amount: Decimal,
    pub before: PairBalances,
    /// Re-read after the settling delay; `None` when nothing moved
    pub after: Option<PairBalances>,
    pub transfer: Option<TransferRequest>,
}

pub struct Rebalancer {
    api: Arc<dyn ExtendedApi>,
    transfers: TransferBuilder,
    config: RebalanceConfig,
    settle_delay: Duration,
}

impl Rebalancer {
    pub fn new(api: Arc<dyn ExtendedApi>, oracle: Arc<dyn SigningOracle>, config: RebalanceConfig) -> Self {
        Self {
            transfers: TransferBuilder::new(Arc::clone(&api), oracle),
            api,
            config,
            settle_delay: constants::rebalance_settle_delay(),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Both balances or a `DataError` naming the account that failed
    pub async fn balances(&self, pair: &AccountPair) -> Result<PairBalances> {
        let (a, b) = tokio::join!(self.available(&pair.a), self.available(&pair.b));
        Ok(PairBalances { a: a?, b: b? })
    }

    async fn available(&self, account: &TradingAccount) -> Result<Decimal> {
        self.api
            .balance(&account.creds)
            .await
            .map(|b| b.available_for_trade)
            .map_err(|e| AppError::data(format!("{}.balance", account.label()), e.to_string()))
    }

    pub async fn rebalance(&self, pair: &AccountPair) -> Result<RebalanceResult> {
        let before = self.balances(pair).await?;
        let plan = plan_rebalance(before, &self.config);

        tracing::info!(
            a = %before.a,
            b = %before.b,
            imbalance_pct = %format_ratio(before.imbalance_pct()),
            action = %plan.action,
            "[REBALANCE] Balances checked"
        );

        let (from, to) = match plan.action {
            RebalanceAction::NoAction => {
                return Ok(RebalanceResult {
                    action: plan.action,
                    amount: Decimal::ZERO,
                    before,
                    after: None,
                    transfer: None,
                })
            }
            RebalanceAction::TransferAToB => (&pair.a, &pair.b),
            RebalanceAction::TransferBToA => (&pair.b, &pair.a),
        };

        let transfer = self
            .transfers
            .send(&from.creds, &from.endpoint(), &to.endpoint(), plan.amount, &self.config.asset)
            .await?;

        tokio::time::sleep(self.settle_delay).await;

        // A failed re-read keeps the pre-transfer figure for that side
        let (a, b) = tokio::join!(self.available(&pair.a), self.available(&pair.b));
        let after = PairBalances {
            a: a.unwrap_or(before.a),
            b: b.unwrap_or(before.b),
        };

        tracing::info!(
            action = %plan.action,
            amount = %transfer.amount,
            a = %after.a,
            b = %after.b,
            "[REBALANCE] Transfer completed"
        );

        Ok(RebalanceResult {
            action: plan.action,
            amount: plan.amount,
            before,
            after: Some(after),
            transfer: Some(transfer),
        })
    }
}

/// Binds a rebalancer to a pair for use inside the retry wrapper
pub struct PairRebalance<'a> {
    pub rebalancer: &'a Rebalancer,
    pub pair: &'a AccountPair,
}

#[async_trait]
impl RebalanceHook for PairRebalance<'_> {
    async fn rebalance(&self) -> Result<()> {
        self.rebalancer.rebalance(self.pair).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::extended::StarkSigningOracle;
    use crate::adapters::test_utils::MockExtendedApi;
    use crate::core::session::TradingAccount;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;

    fn balances(a: Decimal, b: Decimal) -> PairBalances {
        PairBalances { a, b }
    }

    fn pair() -> AccountPair {
        let account = |slot, name: &str, vault| TradingAccount {
            slot,
            creds: MockExtendedApi::creds(name),
            account_id: name.to_string(),
            vault_id: vault,
        };
        AccountPair {
            a: account(1, "a", 500001),
            b: account(2, "b", 500002),
        }
    }

    fn rebalancer(api: Arc<MockExtendedApi>) -> Rebalancer {
        Rebalancer::new(api, StarkSigningOracle::shared(), RebalanceConfig::default())
            .with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_plan_full_imbalance() {
        let plan = plan_rebalance(balances(dec!(100), dec!(0)), &RebalanceConfig::default());
        assert_eq!(plan.action, RebalanceAction::TransferAToB);
        assert_eq!(plan.amount, dec!(50));
    }

    #[test]
    fn test_plan_small_imbalance_is_ignored() {
        let config = RebalanceConfig::default();
        assert_eq!(plan_rebalance(balances(dec!(52), dec!(48)), &config).action, RebalanceAction::NoAction);
        // Difference exactly 2 × min passes the absolute floor but 2% fails the relative one
        assert_eq!(plan_rebalance(balances(dec!(51), dec!(49)), &config).action, RebalanceAction::NoAction);
    }

    #[test]
    fn test_plan_threshold_boundaries() {
        let config = RebalanceConfig::default();
        // difference 2, 5% of 40: both floors met exactly
        let plan = plan_rebalance(balances(dec!(19), dec!(21)), &config);
        assert_eq!(plan.action, RebalanceAction::TransferBToA);
        assert_eq!(plan.amount, dec!(1));

        // difference 1.99 < 2 even though 10% of total
        let plan = plan_rebalance(balances(dec!(10.995), dec!(9.005)), &config);
        assert_eq!(plan.action, RebalanceAction::NoAction);
    }

    #[test]
    fn test_plan_empty_accounts() {
        let plan = plan_rebalance(balances(dec!(0), dec!(0)), &RebalanceConfig::default());
        assert_eq!(plan.action, RebalanceAction::NoAction);
        assert_eq!(balances(dec!(0), dec!(0)).imbalance_pct(), dec!(0));
    }

    #[tokio::test]
    async fn test_rebalance_moves_half_the_difference() {
        let api = Arc::new(
            MockExtendedApi::new()
                .with_account_balance("a", dec!(100))
                .with_account_balance("b", dec!(0)),
        );
        let result = rebalancer(api.clone()).rebalance(&pair()).await.unwrap();

        assert_eq!(result.action, RebalanceAction::TransferAToB);
        assert_eq!(result.before, balances(dec!(100), dec!(0)));
        assert_eq!(result.after, Some(balances(dec!(50), dec!(50))));
        let transfer = result.transfer.unwrap();
        assert_eq!(transfer.from_account, "a");
        assert_eq!(transfer.to_account, "b");
        assert_eq!(transfer.amount, "50");
        assert_eq!(transfer.transferred_asset, "USD");
        assert_eq!(api.transfer_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_balanced_pair_does_not_transfer() {
        let api = Arc::new(
            MockExtendedApi::new()
                .with_account_balance("a", dec!(52))
                .with_account_balance("b", dec!(48)),
        );
        let result = rebalancer(api.clone()).rebalance(&pair()).await.unwrap();
        assert_eq!(result.action, RebalanceAction::NoAction);
        assert!(result.after.is_none());
        assert_eq!(api.transfer_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_balance_failure_aborts_before_transfer() {
        let api = Arc::new(MockExtendedApi::new().with_balance_failure());
        let err = rebalancer(api.clone()).rebalance(&pair()).await.unwrap_err();
        assert!(matches!(err, AppError::Data { .. }));
        assert_eq!(api.transfer_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_propagates() {
        let api = Arc::new(
            MockExtendedApi::new()
                .with_account_balance("a", dec!(10))
                .with_account_balance("b", dec!(90))
                .with_transfer_failure(),
        );
        let err = rebalancer(api).rebalance(&pair()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService { .. }));
    }

    #[tokio::test]
    async fn test_pair_hook_runs_rebalance() {
        let api = Arc::new(
            MockExtendedApi::new()
                .with_account_balance("a", dec!(0))
                .with_account_balance("b", dec!(80)),
        );
        let rebalancer = rebalancer(api.clone());
        let pair = pair();
        let hook = PairRebalance {
            rebalancer: &rebalancer,
            pair: &pair,
        };
        hook.rebalance().await.unwrap();
        assert_eq!(api.available("a"), dec!(40));
    }
}
