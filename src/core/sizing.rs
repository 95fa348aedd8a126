//! Max-size calculator
//!
//! `size = available × 0.95 × leverage / reference_price`, where the
//! reference is the ask for buys and the bid for sells. When the market
//! lookup fails a small table of approximate prices is used instead and the
//! result is flagged `approximate`.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::{ApiCredentials, OrderSide};
use crate::error::{AppError, Result};

/// Share of available collateral the calculator is allowed to commit
pub const SAFETY_MARGIN: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// Last-resort prices, matched on a substring of the market name
const FALLBACK_PRICES: &[(&str, Decimal)] = &[
    ("PEPE", Decimal::from_parts(1, 0, 0, false, 6)),
    ("ETH", Decimal::from_parts(3000, 0, 0, false, 0)),
    ("BTC", Decimal::from_parts(50000, 0, 0, false, 0)),
];

pub fn fallback_price(market: &str) -> Option<Decimal> {
    let upper = market.to_ascii_uppercase();
    FALLBACK_PRICES
        .iter()
        .find(|(symbol, _)| upper.contains(symbol))
        .map(|(_, price)| *price)
}

/// Size affordable with `available` collateral at `price`
pub fn size_for_balance(available: Decimal, leverage: u32, price: Decimal) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(AppError::Validation(format!("Reference price must be > 0, got {}", price)));
    }
    Ok(available * SAFETY_MARGIN * Decimal::from(leverage) / price)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaxSize {
    pub size: Decimal,
    pub price: Decimal,
    pub available: Decimal,
    /// The price came from the fallback table
    pub approximate: bool,
}

pub struct MaxSizeCalculator {
    api: Arc<dyn ExtendedApi>,
}

impl MaxSizeCalculator {
    pub fn new(api: Arc<dyn ExtendedApi>) -> Self {
        Self { api }
    }

    pub async fn max_size(
        &self,
        creds: &ApiCredentials,
        market: &str,
        side: OrderSide,
        leverage: u32,
    ) -> Result<MaxSize> {
        let balance = self.api.balance(creds).await?;
        let available = balance.available_for_trade;
        if available <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Insufficient balance for {}: available {}",
                market, available
            )));
        }

        let (price, approximate) = match self.api.market(market).await {
            Ok(meta) => match meta.reference_price(side) {
                Some(price) => (price, false),
                None => (self.fallback(market)?, true),
            },
            Err(e) => {
                tracing::warn!(market = %market, error = %e, "[ORDER] Market lookup failed, using fallback price");
                (self.fallback(market)?, true)
            }
        };

        let size = size_for_balance(available, leverage, price)?;
        tracing::debug!(
            market = %market,
            side = %side,
            available = %available,
            price = %price,
            size = %size,
            approximate,
            "[ORDER] Max size computed"
        );

        Ok(MaxSize {
            size,
            price,
            available,
            approximate,
        })
    }

    fn fallback(&self, market: &str) -> Result<Decimal> {
        fallback_price(market)
            .ok_or_else(|| AppError::Config(format!("Cannot determine price for {}", market)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_utils::MockExtendedApi;
    use rust_decimal_macros::dec;

    #[test]
    fn test_size_formula() {
        assert_eq!(size_for_balance(dec!(100), 10, dec!(50000)).unwrap(), dec!(0.019));
        assert!(size_for_balance(dec!(100), 1, dec!(0)).is_err());
    }

    #[test]
    fn test_fallback_prices() {
        assert_eq!(fallback_price("1000PEPE-USD"), Some(dec!(0.000001)));
        assert_eq!(fallback_price("eth-usd"), Some(dec!(3000)));
        assert_eq!(fallback_price("BTC-USD"), Some(dec!(50000)));
        assert_eq!(fallback_price("SOL-USD"), None);
    }

    #[tokio::test]
    async fn test_max_size_uses_ask_for_buys() {
        let api = Arc::new(MockExtendedApi::new().with_balance(dec!(100)).with_book(dec!(99), dec!(100)));
        let calc = MaxSizeCalculator::new(api);
        let result = calc
            .max_size(&MockExtendedApi::creds("a"), "BTC-USD", OrderSide::Buy, 2)
            .await
            .unwrap();
        assert_eq!(result.price, dec!(100));
        assert_eq!(result.size, dec!(1.9));
        assert!(!result.approximate);
    }

    #[tokio::test]
    async fn test_max_size_falls_back_when_market_fails() {
        let api = Arc::new(MockExtendedApi::new().with_balance(dec!(100)).with_market_failure());
        let calc = MaxSizeCalculator::new(api);
        let result = calc
            .max_size(&MockExtendedApi::creds("a"), "ETH-USD", OrderSide::Sell, 1)
            .await
            .unwrap();
        assert_eq!(result.price, dec!(3000));
        assert!(result.approximate);

        let err = calc
            .max_size(&MockExtendedApi::creds("a"), "SOL-USD", OrderSide::Sell, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_max_size_requires_positive_balance() {
        let api = Arc::new(MockExtendedApi::new().with_balance(dec!(0)));
        let calc = MaxSizeCalculator::new(api);
        let err = calc
            .max_size(&MockExtendedApi::creds("a"), "BTC-USD", OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
