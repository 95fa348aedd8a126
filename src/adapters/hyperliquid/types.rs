//! Hyperliquid Types
//!
//! WebSocket channel payloads (`l2Book`, `webData2`) and the `/exchange`
//! order response.
//!
//! L2 Book format:
//!   levels[0] = Bids (highest to lowest)
//!   levels[1] = Asks (lowest to highest)
//!   Each level: { px: "price", sz: "size", n: count }

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::numeric::parse_decimal;

// =============================================================================
// WebSocket Message Types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidLevel {
    pub px: String,
    pub sz: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub n: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidBookData {
    pub coin: String,
    /// [bids, asks]
    pub levels: (Vec<HyperliquidLevel>, Vec<HyperliquidLevel>),
    #[serde(default)]
    pub time: u64,
}

/// Best bid and ask of one coin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookTop {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl HyperliquidBookData {
    /// `None` while either side is empty or unparseable
    pub fn top(&self) -> Option<BookTop> {
        let bid = self.levels.0.first().and_then(|l| parse_decimal(&l.px))?;
        let ask = self.levels.1.first().and_then(|l| parse_decimal(&l.px))?;
        if bid <= Decimal::ZERO || ask <= Decimal::ZERO {
            return None;
        }
        Some(BookTop { bid, ask })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotBalance {
    pub coin: String,
    pub total: String,
    #[serde(default)]
    pub hold: Option<String>,
}

impl SpotBalance {
    pub fn total_amount(&self) -> Decimal {
        parse_decimal(&self.total).unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotState {
    #[serde(default)]
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebData2 {
    #[serde(default)]
    pub spot_state: Option<SpotState>,
}

/// Top-level WebSocket message (channel envelope)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "channel", content = "data")]
pub(crate) enum HyperliquidWsMessage {
    #[serde(rename = "l2Book")]
    L2Book(HyperliquidBookData),
    #[serde(rename = "webData2")]
    WebData2(WebData2),
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "subscriptionResponse")]
    SubscriptionResponse(Value),
}

/// Spot balances of a user: USDC plus every other non-zero token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSnapshot {
    pub usdc: Decimal,
    pub tokens: Vec<(String, Decimal)>,
}

impl From<&WebData2> for UserSnapshot {
    fn from(data: &WebData2) -> Self {
        let mut snapshot = UserSnapshot::default();
        let balances = data.spot_state.as_ref().map(|s| s.balances.as_slice()).unwrap_or(&[]);
        for balance in balances {
            let total = balance.total_amount();
            if balance.coin == "USDC" {
                snapshot.usdc = total;
            } else if total > Decimal::ZERO {
                snapshot.tokens.push((balance.coin.clone(), total));
            }
        }
        snapshot
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

pub fn l2_book_subscription(coin: &str) -> Value {
    json!({
        "method": "subscribe",
        "subscription": { "type": "l2Book", "coin": coin }
    })
}

pub fn web_data_subscription(user: &str) -> Value {
    json!({
        "method": "subscribe",
        "subscription": { "type": "webData2", "user": user }
    })
}

// =============================================================================
// Exchange response
// =============================================================================

/// Outcome of `POST /exchange` for an order action. Accepted means
/// `status == "ok"` and no per-order `error`.
pub fn order_response_error(response: &Value) -> Option<String> {
    let status = response.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "ok" {
        return Some(match response.get("response") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("unexpected status '{}'", status),
        });
    }

    response
        .pointer("/response/data/statuses")
        .and_then(Value::as_array)
        .and_then(|statuses| {
            statuses
                .iter()
                .find_map(|s| s.get("error").and_then(Value::as_str).map(str::to_string))
        })
}
