//! Exchange boundary traits
//!
//! `ExtendedApi` is the seam between the orchestration logic and the
//! Extended REST API. The production implementation is
//! [`ExtendedClient`](crate::adapters::extended::ExtendedClient); tests
//! substitute in-memory mocks.
//!
//! `MicroVenue` is the narrower surface the humanizer trades through
//! (implemented by [`HyperliquidVenue`](crate::adapters::hyperliquid::HyperliquidVenue)).

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::adapters::types::{
    AccountInfo, ApiCredentials, Balance, FeeSchedule, MarketMetadata, OpenOrder, OrderAck,
    Position, SignedOrder, StarknetDomain, Ticker, TransferRequest,
};
use crate::adapters::hyperliquid::BookTop;
use crate::error::Result;

/// Extended REST API surface used by the bot.
///
/// Every method returns a typed error; deciding whether a failure is
/// fatal is left to the caller.
#[async_trait]
pub trait ExtendedApi: Send + Sync {
    /// Trading config, stats and l2 config of one market (`/info/markets?market=`)
    async fn market(&self, market: &str) -> Result<MarketMetadata>;

    /// Fee rates the account pays on a market (`/user/fees?market=`)
    async fn fees(&self, creds: &ApiCredentials, market: &str) -> Result<FeeSchedule>;

    /// Signing domain (`/info/starknet`)
    async fn starknet_domain(&self) -> Result<StarknetDomain>;

    /// Collateral balance. A 404 means an empty account and yields `Balance::zero()`.
    async fn balance(&self, creds: &ApiCredentials) -> Result<Balance>;

    async fn account_info(&self, creds: &ApiCredentials) -> Result<AccountInfo>;

    async fn positions(&self, creds: &ApiCredentials) -> Result<Vec<Position>>;

    async fn open_orders(&self, creds: &ApiCredentials) -> Result<Vec<OpenOrder>>;

    /// Returns true when the exchange answered `status == "OK"`
    async fn set_leverage(&self, creds: &ApiCredentials, market: &str, leverage: u32) -> Result<bool>;

    async fn submit_order(&self, creds: &ApiCredentials, order: &SignedOrder) -> Result<OrderAck>;

    async fn cancel_order(&self, creds: &ApiCredentials, order_id: &str) -> Result<()>;

    /// All tickers, or the one for `asset`
    async fn tickers(&self, asset: Option<&str>) -> Result<Vec<Ticker>>;

    /// Names of the listed markets
    async fn available_markets(&self) -> Result<Vec<String>>;

    async fn transfer(&self, creds: &ApiCredentials, request: &TransferRequest) -> Result<()>;
}

/// Single-coin order venue used by the randomized micro-cycles.
#[async_trait]
pub trait MicroVenue: Send + Sync {
    /// Latest best bid/ask, `None` until the feed delivered a full book
    async fn book(&self) -> Option<BookTop>;

    /// Spendable USDC of the trading wallet
    async fn usdc_balance(&self) -> Result<Decimal>;

    /// Submit one IOC limit order. `Ok` means accepted without a per-order error.
    async fn place_ioc(&self, is_buy: bool, price: Decimal, size: Decimal) -> Result<()>;
}
