//! Hyperliquid order venue
//!
//! Signs IOC limit orders with the agent key and posts them to
//! `/exchange`. Prices come from the shared [`PriceFeed`].

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::config::HyperliquidConfig;
use super::signing::{
    format_price, format_size, parse_agent_key, sign_l1_action, BuilderInfo, OrderAction,
    OrderTypeWire, OrderWire,
};
use super::types::{order_response_error, BookTop};
use super::ws::{fetch_user_snapshot, PriceFeed};
use crate::adapters::traits::MicroVenue;
use crate::adapters::types::create_http_client;
use crate::config::{constants, HumanizerConfig};
use crate::core::logging::sanitize;
use crate::error::{AppError, Result};

const SERVICE: &str = "hyperliquid";

/// Price offsets tried after the book price fails: 0.10 % to 0.30 %
const FALLBACK_DELTAS: [Decimal; 5] = [
    Decimal::from_parts(1, 0, 0, false, 3),
    Decimal::from_parts(15, 0, 0, false, 4),
    Decimal::from_parts(2, 0, 0, false, 3),
    Decimal::from_parts(25, 0, 0, false, 4),
    Decimal::from_parts(3, 0, 0, false, 3),
];

fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct HyperliquidVenue {
    config: HyperliquidConfig,
    http: reqwest::Client,
    signer: PrivateKeySigner,
    user_address: String,
    market_index: u32,
    sz_decimals: u32,
    spot: bool,
    builder: BuilderInfo,
    feed: Arc<PriceFeed>,
}

impl HyperliquidVenue {
    pub fn new(
        config: HyperliquidConfig,
        agent_key: &str,
        user_address: &str,
        humanizer: &HumanizerConfig,
        feed: Arc<PriceFeed>,
    ) -> Result<Self> {
        let signer = parse_agent_key(agent_key)?;
        tracing::info!(
            agent = %signer.address(),
            user = %sanitize(user_address),
            coin = %humanizer.coin,
            "[HUMANIZER] Hyperliquid venue ready"
        );
        Ok(Self {
            http: create_http_client(SERVICE, constants::request_timeout()),
            config,
            signer,
            user_address: user_address.to_string(),
            market_index: humanizer.market_index,
            sz_decimals: humanizer.sz_decimals,
            spot: humanizer.spot,
            builder: humanizer.builder.into(),
            feed,
        })
    }

    fn order_action(&self, is_buy: bool, price: Decimal, size: Decimal) -> OrderAction {
        OrderAction::ioc(
            OrderWire {
                asset: self.market_index,
                is_buy,
                limit_px: format_price(price, self.sz_decimals, self.spot),
                sz: format_size(size, self.sz_decimals),
                reduce_only: false,
                order_type: OrderTypeWire::ioc(),
            },
            Some(self.builder.clone()),
        )
    }
}

#[async_trait]
impl MicroVenue for HyperliquidVenue {
    async fn book(&self) -> Option<BookTop> {
        self.feed.latest().await
    }

    /// A missing snapshot is an error, never a zero balance
    async fn usdc_balance(&self) -> Result<Decimal> {
        fetch_user_snapshot(&self.config, &self.user_address)
            .await
            .map(|snapshot| snapshot.usdc)
            .ok_or_else(|| AppError::external(SERVICE, None, "No balance snapshot received"))
    }

    async fn place_ioc(&self, is_buy: bool, price: Decimal, size: Decimal) -> Result<()> {
        let action = self.order_action(is_buy, price, size);
        let nonce = current_time_ms();
        let signature = sign_l1_action(&self.signer, &action, nonce, self.config.production).await?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": Value::Null,
        });

        tracing::debug!(
            coin_index = self.market_index,
            is_buy,
            price = %action.orders[0].limit_px,
            size = %action.orders[0].sz,
            "[HUMANIZER] Submitting IOC order"
        );

        let response = self.http.post(self.config.exchange_url()).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AppError::external(SERVICE, Some(status.as_u16()), text));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| AppError::data("exchange response", e.to_string()))?;
        match order_response_error(&payload) {
            None => Ok(()),
            Some(message) => Err(AppError::external(SERVICE, None, message)),
        }
    }
}

/// Try the book price, then widen it step by step until an attempt is accepted.
/// Returns `false` when every attempt failed.
pub async fn place_ioc_with_fallback(
    venue: &dyn MicroVenue,
    base_price: Decimal,
    size: Decimal,
    is_buy: bool,
) -> bool {
    match venue.place_ioc(is_buy, base_price, size).await {
        Ok(()) => return true,
        Err(e) => tracing::warn!(price = %base_price, error = %e, "[HUMANIZER] IOC failed at book price"),
    }

    for delta in FALLBACK_DELTAS {
        let price = if is_buy {
            base_price * (Decimal::ONE + delta)
        } else {
            base_price * (Decimal::ONE - delta)
        };
        match venue.place_ioc(is_buy, price, size).await {
            Ok(()) => {
                tracing::info!(delta_pct = %(delta * Decimal::ONE_HUNDRED), "[HUMANIZER] IOC fallback filled");
                return true;
            }
            Err(e) => tracing::warn!(price = %price, error = %e, "[HUMANIZER] IOC fallback failed"),
        }
    }

    tracing::error!("[HUMANIZER] All IOC attempts failed");
    false
}
