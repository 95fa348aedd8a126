//! Order-payload builder
//!
//! Turns (market, side, size, slippage) into a signed IOC market order:
//!
//! 1. market metadata, fee schedule and signing domain are fetched together
//! 2. size is clamped up to the minimum, then rounded *down* to the size step
//! 3. price = book reference ± slippage, rounded down to the price step
//! 4. fixed-point amounts are computed from the *rounded* price string
//! 5. the order hash is signed and every hex value padded to 64 chars
//!
//! Steps 2-5 live in [`compose_order`], which is pure and deterministic for
//! a given nonce and clock.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rust_decimal::prelude::*;

use super::signing::{OrderHashParams, SigningOracle};
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::{
    ApiCredentials, DebuggingAmounts, FeeSchedule, MarketMetadata, OrderSettlement, OrderSide,
    SignedOrder, StarkSignature, StarknetDomain,
};
use crate::config::constants;
use crate::core::numeric::{
    ensure_hex_prefix, format_ratio, format_with_decimals, hex_to_decimal_string, pad_hex_to_64,
    parse_decimal, round_to_increment, RoundMode,
};
use crate::error::{AppError, Result};

/// Nonces are drawn from `[0, 2^31 - 1)`
const MAX_NONCE: u64 = (1 << 31) - 1;

/// Settlement layer expects this much extra validity on top of the API expiry
const STARKNET_EXPIRY_BUFFER_SECS: u64 = 14 * 24 * 3600;

const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn random_nonce() -> u64 {
    rand::thread_rng().gen_range(0..MAX_NONCE)
}

/// Seconds-based expiration signed over, derived from the API expiry in ms
pub fn starknet_expiration(expiry_epoch_millis: u64) -> u64 {
    expiry_epoch_millis.div_ceil(1000) + STARKNET_EXPIRY_BUFFER_SECS
}

/// `0x` + 64 hex chars, the only width the exchange validates
pub fn fixed_width_hex(hex: &str) -> String {
    ensure_hex_prefix(&pad_hex_to_64(hex))
}

/// What the caller wants traded
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub market: String,
    pub side: OrderSide,
    /// `None` lets `AccountOps` size the order from available balance;
    /// the builder itself only accepts a resolved size
    pub size: Option<Decimal>,
    /// Defaults to 75 bps
    pub slippage_bps: Option<Decimal>,
    pub reduce_only: bool,
    /// Set on the market before opening, and used when sizing from balance
    pub leverage: u32,
}

impl OrderRequest {
    pub fn market(market: &str, side: OrderSide, size: Option<Decimal>) -> Self {
        Self {
            market: market.to_string(),
            side,
            size,
            slippage_bps: None,
            reduce_only: false,
            leverage: 1,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_slippage(mut self, bps: Decimal) -> Self {
        self.slippage_bps = Some(bps);
        self
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }
}

/// Everything [`compose_order`] needs, already fetched
pub struct OrderInputs<'a> {
    pub market: &'a MarketMetadata,
    pub fees: &'a FeeSchedule,
    pub domain: &'a StarknetDomain,
    pub side: OrderSide,
    pub size: Option<Decimal>,
    pub slippage_bps: Decimal,
    pub reduce_only: bool,
    pub vault_id: u64,
    pub private_key: &'a str,
    pub public_key: &'a str,
    pub nonce: u64,
    pub now_ms: u64,
}

/// Quantity after min clamp and step round-down
pub fn order_quantity(market: &MarketMetadata, requested: Option<Decimal>) -> Result<Decimal> {
    let min = market.min_order_size;
    let requested = requested.filter(|s| *s > Decimal::ZERO).unwrap_or(min);
    let step = if market.min_order_size_change > Decimal::ZERO {
        market.min_order_size_change
    } else {
        min
    };
    let rounded = round_to_increment(requested.max(min), step, RoundMode::Down)
        .ok_or_else(|| AppError::data("qty", format!("Size {} out of range for step {}", requested, step)))?;
    Ok(rounded.max(min))
}

/// Book reference moved outward by the slippage, rounded down to the price step
pub fn order_price(market: &MarketMetadata, side: OrderSide, slippage_bps: Decimal) -> Result<Decimal> {
    let reference = market.reference_price(side).ok_or_else(|| {
        AppError::Validation(format!("No reference price available for {}", market.market))
    })?;

    let out_of_range = || AppError::data("price", format!("Price out of range for {}", market.market));
    let slippage = slippage_bps / BPS_DIVISOR;
    let adjusted = match side {
        OrderSide::Buy => reference.checked_mul(Decimal::ONE + slippage),
        OrderSide::Sell => reference.checked_mul((Decimal::ONE - slippage).max(Decimal::ZERO)),
    }
    .ok_or_else(out_of_range)?;

    let step = market.min_price_change;
    let base = adjusted.max(step);
    let rounded = round_to_increment(base, step, RoundMode::Down).ok_or_else(out_of_range)?;
    Ok(rounded.max(step))
}

fn checked_product(factors: &[Decimal], field: &str) -> Result<Decimal> {
    factors
        .iter()
        .try_fold(Decimal::ONE, |acc, f| acc.checked_mul(*f))
        .ok_or_else(|| AppError::data(field, "Amount out of range"))
}

fn to_units(value: Decimal, mode: RoundMode, field: &str) -> Result<u128> {
    let rounded = match mode {
        RoundMode::Up => value.ceil(),
        RoundMode::Down => value.floor(),
    };
    rounded
        .to_u128()
        .ok_or_else(|| AppError::data(field, format!("Amount out of range: {}", value)))
}

/// Build and sign an order from pre-fetched inputs.
pub fn compose_order(oracle: &dyn SigningOracle, inputs: &OrderInputs<'_>) -> Result<SignedOrder> {
    let market = inputs.market;

    let qty = format_with_decimals(order_quantity(market, inputs.size)?, market.qty_decimals);
    let price = format_with_decimals(
        order_price(market, inputs.side, inputs.slippage_bps)?,
        market.price_decimals,
    );

    // Amounts use the strings the exchange will see, not the pre-rounding values
    let size = parse_decimal(&qty).ok_or_else(|| AppError::data("qty", qty.clone()))?;
    let rounded_price = parse_decimal(&price).ok_or_else(|| AppError::data("price", price.clone()))?;

    let fee_rate = inputs.fees.effective_rate();
    let collateral_decimal = checked_product(&[size, rounded_price], "collateralAmount")?;
    let collateral_scaled = checked_product(&[collateral_decimal, market.collateral_resolution], "collateralAmount")?;

    let collateral_amount = match inputs.side {
        OrderSide::Buy => to_units(collateral_scaled, RoundMode::Up, "collateralAmount")?,
        OrderSide::Sell => to_units(collateral_scaled, RoundMode::Down, "collateralAmount")?,
    };
    let fee_amount = to_units(
        checked_product(&[collateral_decimal, fee_rate, market.collateral_resolution], "feeAmount")?,
        RoundMode::Up,
        "feeAmount",
    )?;
    let synthetic_amount = to_units(
        checked_product(&[size, market.synthetic_resolution], "syntheticAmount")?,
        RoundMode::Down,
        "syntheticAmount",
    )?;

    let expiry_epoch_millis = inputs.now_ms + constants::order_expiry().as_millis() as u64;

    let (base_amount, quote_amount) = match inputs.side {
        OrderSide::Buy => (synthetic_amount as i128, -(collateral_amount as i128)),
        OrderSide::Sell => (-(synthetic_amount as i128), collateral_amount as i128),
    };

    let order_hash = oracle.derive_order_hash(&OrderHashParams {
        position_id: inputs.vault_id,
        base_asset_id: market.synthetic_asset_id.clone(),
        base_amount,
        quote_asset_id: market.collateral_asset_id.clone(),
        quote_amount,
        fee_asset_id: market.collateral_asset_id.clone(),
        fee_amount,
        expiration: starknet_expiration(expiry_epoch_millis),
        salt: inputs.nonce,
        user_public_key: inputs.public_key.to_string(),
        domain: inputs.domain.clone(),
    })?;

    let padded_hash = pad_hex_to_64(&order_hash);
    let signature = oracle.sign(inputs.private_key, &padded_hash)?;

    let order = SignedOrder {
        id: hex_to_decimal_string(&padded_hash)?,
        market: market.market.clone(),
        order_type: "MARKET".to_string(),
        side: inputs.side,
        qty,
        price,
        time_in_force: "IOC".to_string(),
        expiry_epoch_millis,
        fee: format_ratio(fee_rate),
        nonce: inputs.nonce.to_string(),
        settlement: OrderSettlement {
            signature: StarkSignature {
                r: fixed_width_hex(&signature.r),
                s: fixed_width_hex(&signature.s),
            },
            stark_key: inputs.public_key.to_string(),
            collateral_position: inputs.vault_id.to_string(),
        },
        reduce_only: inputs.reduce_only,
        post_only: false,
        debugging_amounts: DebuggingAmounts {
            collateral_amount: collateral_amount.to_string(),
            fee_amount: fee_amount.to_string(),
            synthetic_amount: synthetic_amount.to_string(),
        },
    };

    tracing::debug!(
        market = %order.market,
        side = %order.side,
        qty = %order.qty,
        price = %order.price,
        collateral = %order.debugging_amounts.collateral_amount,
        fee = %order.debugging_amounts.fee_amount,
        "[ORDER] Order composed"
    );

    Ok(order)
}

/// Fetches the inputs of [`compose_order`] and signs the result
pub struct OrderBuilder {
    api: Arc<dyn ExtendedApi>,
    oracle: Arc<dyn SigningOracle>,
}

impl OrderBuilder {
    pub fn new(api: Arc<dyn ExtendedApi>, oracle: Arc<dyn SigningOracle>) -> Self {
        Self { api, oracle }
    }

    pub async fn build(
        &self,
        creds: &ApiCredentials,
        vault_id: u64,
        request: &OrderRequest,
    ) -> Result<SignedOrder> {
        let (market, fees, domain) = tokio::try_join!(
            self.api.market(&request.market),
            self.api.fees(creds, &request.market),
            self.api.starknet_domain(),
        )?;

        let size = match request.size {
            Some(size) if size > Decimal::ZERO => size,
            _ => {
                return Err(AppError::Validation(format!(
                    "Order on {} needs a positive size before signing",
                    request.market
                )))
            }
        };

        let public_key = if creds.public_key.trim().is_empty() {
            self.oracle.public_key(&creds.private_key)?
        } else {
            creds.public_key.clone()
        };

        compose_order(
            self.oracle.as_ref(),
            &OrderInputs {
                market: &market,
                fees: &fees,
                domain: &domain,
                side: request.side,
                size: Some(size),
                slippage_bps: request.slippage_bps.unwrap_or(Decimal::from(75)),
                reduce_only: request.reduce_only,
                vault_id,
                private_key: &creds.private_key,
                public_key: &public_key,
                nonce: random_nonce(),
                now_ms: current_time_ms(),
            },
        )
    }
}
