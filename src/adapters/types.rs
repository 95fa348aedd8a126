//! Core data types for exchange adapters
//!
//! Market metadata, account state and the signed order/transfer payloads
//! shared by the Extended client, the order builder and the orchestrator.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::numeric::{decimal_places, normalize_asset_id_hex, parse_number_from_api};
use crate::error::{AppError, Result};

// =============================================================================
// HTTP Client
// =============================================================================

/// HTTP connection timeout (milliseconds)
const HTTP_CONNECT_TIMEOUT_MS: u64 = 3000;
/// Max idle connections per host in connection pool
const HTTP_POOL_MAX_IDLE: usize = 5;
/// How long idle connections stay in the pool (seconds)
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 60;

/// Create a pooled HTTP client for a REST boundary
pub fn create_http_client(service: &str, timeout: Duration) -> reqwest::Client {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE)
        .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
        .connect_timeout(Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    tracing::debug!(
        phase = "init",
        service = %service,
        timeout_ms = timeout.as_millis() as u64,
        "HTTP client configured"
    );
    client
}

// =============================================================================
// Orders
// =============================================================================

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(OrderSide::Buy),
            "SELL" | "SHORT" => Ok(OrderSide::Sell),
            other => Err(AppError::Validation(format!("Unknown order side: {}", other))),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// API credentials of one Extended sub-account.
///
/// `Debug` never prints the private key and only a prefix of the API key.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    /// Stark public key (`0x`-prefixed hex)
    pub public_key: String,
    /// Stark private key (`0x`-prefixed hex), decrypted and in memory only
    pub private_key: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &crate::core::logging::sanitize(&self.api_key))
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Market Metadata
// =============================================================================

/// Trading configuration of one market, taken from a single
/// `/info/markets` response. Increments and decimals always come from the
/// same fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketMetadata {
    pub market: String,
    pub min_order_size: Decimal,
    /// Size step; falls back to `min_order_size` when the market omits it
    pub min_order_size_change: Decimal,
    pub min_price_change: Decimal,
    pub qty_decimals: u32,
    pub price_decimals: u32,
    pub ask_price: Option<Decimal>,
    pub bid_price: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub collateral_asset_id: String,
    pub synthetic_asset_id: String,
    pub collateral_resolution: Decimal,
    pub synthetic_resolution: Decimal,
}

impl MarketMetadata {
    /// Parse a market entry (`data[0]` of `/info/markets`).
    pub fn from_json(entry: &Value) -> Result<Self> {
        let trading = entry
            .get("tradingConfig")
            .filter(|v| v.is_object())
            .ok_or_else(|| AppError::Validation("Market trading config missing".into()))?;
        let l2 = entry
            .get("l2Config")
            .filter(|v| v.is_object())
            .ok_or_else(|| AppError::Validation("Market l2 config missing".into()))?;
        let stats = entry.get("marketStats");

        let market = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let min_order_size =
            parse_number_from_api(trading.get("minOrderSize"), "tradingConfig.minOrderSize")?;
        let (min_order_size_change, qty_decimals) = match trading.get("minOrderSizeChange") {
            Some(raw) if !raw.is_null() => (
                parse_number_from_api(Some(raw), "tradingConfig.minOrderSizeChange")?,
                decimal_places(Some(raw)),
            ),
            _ => (min_order_size, decimal_places(trading.get("minOrderSize"))),
        };
        let min_price_change =
            parse_number_from_api(trading.get("minPriceChange"), "tradingConfig.minPriceChange")?;
        let price_decimals = decimal_places(trading.get("minPriceChange"));

        let stat = |name: &str| -> Result<Option<Decimal>> {
            match stats.and_then(|s| s.get(name)) {
                None | Some(Value::Null) => Ok(None),
                raw => parse_number_from_api(raw, &format!("marketStats.{}", name)).map(Some),
            }
        };

        Ok(Self {
            market,
            min_order_size,
            min_order_size_change,
            min_price_change,
            qty_decimals,
            price_decimals,
            ask_price: stat("askPrice")?,
            bid_price: stat("bidPrice")?,
            last_price: stat("lastPrice")?,
            collateral_asset_id: normalize_asset_id_hex(l2.get("collateralId"), "l2Config.collateralId")?,
            synthetic_asset_id: normalize_asset_id_hex(l2.get("syntheticId"), "l2Config.syntheticId")?,
            collateral_resolution: parse_number_from_api(
                l2.get("collateralResolution"),
                "l2Config.collateralResolution",
            )?,
            synthetic_resolution: parse_number_from_api(
                l2.get("syntheticResolution"),
                "l2Config.syntheticResolution",
            )?,
        })
    }

    /// Ask for buys, bid for sells, last trade when that side is empty.
    pub fn reference_price(&self, side: OrderSide) -> Option<Decimal> {
        let book = match side {
            OrderSide::Buy => self.ask_price,
            OrderSide::Sell => self.bid_price,
        };
        book.filter(|p| *p > Decimal::ZERO)
            .or(self.last_price.filter(|p| *p > Decimal::ZERO))
    }
}

/// Maker/taker fee rates for one market
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub market: String,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
}

impl FeeSchedule {
    pub fn from_json(entry: &Value) -> Result<Self> {
        Ok(Self {
            market: entry
                .get("market")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            maker_fee_rate: parse_number_from_api(entry.get("makerFeeRate"), "fees.makerFeeRate")?,
            taker_fee_rate: parse_number_from_api(entry.get("takerFeeRate"), "fees.takerFeeRate")?,
        })
    }

    /// The rate the signed fee is computed with
    pub fn effective_rate(&self) -> Decimal {
        self.maker_fee_rate.max(self.taker_fee_rate)
    }
}

/// SNIP-12 domain the exchange signs under (`/info/starknet`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarknetDomain {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(deserialize_with = "string_or_number")]
    pub chain_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub revision: String,
}

// =============================================================================
// Account State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(default)]
    pub collateral_name: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub equity: Decimal,
    #[serde(default)]
    pub available_for_trade: Decimal,
    #[serde(default)]
    pub available_for_withdrawal: Decimal,
    #[serde(default)]
    pub unrealised_pnl: Decimal,
    #[serde(default)]
    pub initial_margin: Decimal,
    #[serde(default)]
    pub margin_ratio: Decimal,
}

impl Balance {
    /// What the exchange means by a 404 on `/user/balance`.
    pub fn zero() -> Self {
        let zero = Decimal::new(0, 2);
        Self {
            collateral_name: "USDC".to_string(),
            balance: zero,
            equity: zero,
            available_for_trade: zero,
            available_for_withdrawal: zero,
            unrealised_pnl: zero,
            initial_margin: zero,
            margin_ratio: zero,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub l2_key: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub l2_vault: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub account_id: Option<String>,
}

/// Position direction as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that flattens this position
    pub fn closing_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub market: String,
    pub side: PositionSide,
    pub size: Decimal,
    #[serde(default)]
    pub leverage: Option<Decimal>,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub unrealised_pnl: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub side: Option<OrderSide>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub qty: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    #[serde(alias = "asset", default)]
    pub symbol: String,
    #[serde(default)]
    pub bid_price: Option<Decimal>,
    #[serde(default)]
    pub ask_price: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

// =============================================================================
// Signed Payloads
// =============================================================================

/// Stark ECDSA signature, both components `0x`-prefixed hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarkSignature {
    pub r: String,
    pub s: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSettlement {
    pub signature: StarkSignature,
    pub stark_key: String,
    pub collateral_position: String,
}

/// Fixed-point amounts the signature was computed over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggingAmounts {
    pub collateral_amount: String,
    pub fee_amount: String,
    pub synthetic_amount: String,
}

/// Exchange-ready market order, signed and ready for `POST /user/order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub id: String,
    pub market: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    pub qty: String,
    pub price: String,
    pub time_in_force: String,
    pub expiry_epoch_millis: u64,
    pub fee: String,
    pub nonce: String,
    pub settlement: OrderSettlement,
    pub reduce_only: bool,
    pub post_only: bool,
    pub debugging_amounts: DebuggingAmounts,
}

/// Normalized answer to an order submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSettlement {
    pub amount: String,
    pub asset_id: String,
    pub expiration_timestamp: u64,
    pub nonce: u64,
    pub receiver_position_id: u64,
    pub receiver_public_key: String,
    pub sender_position_id: u64,
    pub sender_public_key: String,
    pub signature: StarkSignature,
}

/// Body of `POST /user/transfer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
    pub transferred_asset: String,
    pub settlement: TransferSettlement,
}

// =============================================================================
// Serde helpers
// =============================================================================

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_string(value).ok_or_else(|| serde::de::Error::custom("expected string or number"))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}
