//! Shared test doubles
//!
//! In-memory stand-ins for the Extended API, the credential/status store and
//! the micro-cycle venue. Accounts are keyed by API key; `creds(name)` builds
//! credentials whose API key and account id are both `name`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::adapters::extended::signing::tests::{test_domain, TEST_PRIVATE_KEY};
use crate::adapters::extended::{SigningOracle, StarkSigningOracle};
use crate::adapters::hyperliquid::BookTop;
use crate::adapters::store::{CredentialStore, Slot, StatusStore, StoredCredentials, UserBotConfig};
use crate::adapters::traits::{ExtendedApi, MicroVenue};
use crate::adapters::types::{
    AccountInfo, ApiCredentials, Balance, FeeSchedule, MarketMetadata, OpenOrder, OrderAck,
    OrderSide, Position, PositionSide, SignedOrder, StarknetDomain, Ticker, TransferRequest,
};
use crate::error::{AppError, Result};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn balance_of(available: Decimal) -> Balance {
    Balance {
        collateral_name: "USDC".into(),
        balance: available,
        equity: available,
        available_for_trade: available,
        available_for_withdrawal: available,
        unrealised_pnl: Decimal::ZERO,
        initial_margin: Decimal::ZERO,
        margin_ratio: Decimal::ZERO,
    }
}

// =============================================================================
// Extended API
// =============================================================================

pub struct MockExtendedApi {
    default_balance: Decimal,
    balances: Mutex<HashMap<String, Decimal>>,
    positions: Mutex<HashMap<String, Vec<Position>>>,
    /// api key → (account id, vault)
    accounts: Mutex<HashMap<String, (String, Option<String>)>>,
    order_failures: Mutex<HashMap<String, VecDeque<String>>>,
    book: (Decimal, Decimal),
    market_fails: bool,
    balance_fails: AtomicBool,
    transfer_fails: bool,
    pub submitted: Mutex<Vec<(String, SignedOrder)>>,
    pub transfers: Mutex<Vec<TransferRequest>>,
    pub order_count: Arc<AtomicU64>,
    pub transfer_count: Arc<AtomicU64>,
    pub balance_calls: Arc<AtomicU64>,
    pub leverage_calls: Arc<AtomicU64>,
    pub account_info_calls: Arc<AtomicU64>,
}

impl MockExtendedApi {
    pub fn new() -> Self {
        Self {
            default_balance: dec!(100),
            balances: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            order_failures: Mutex::new(HashMap::new()),
            book: (dec!(99), dec!(100)),
            market_fails: false,
            balance_fails: AtomicBool::new(false),
            transfer_fails: false,
            submitted: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            order_count: Arc::new(AtomicU64::new(0)),
            transfer_count: Arc::new(AtomicU64::new(0)),
            balance_calls: Arc::new(AtomicU64::new(0)),
            leverage_calls: Arc::new(AtomicU64::new(0)),
            account_info_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Credentials with a valid Stark key; API key and account id are `name`
    pub fn creds(name: &str) -> ApiCredentials {
        ApiCredentials {
            api_key: name.to_string(),
            public_key: StarkSigningOracle.public_key(TEST_PRIVATE_KEY).unwrap(),
            private_key: TEST_PRIVATE_KEY.to_string(),
        }
    }

    /// Balance of every account without an explicit one
    pub fn with_balance(mut self, available: Decimal) -> Self {
        self.default_balance = available;
        self
    }

    pub fn with_account_balance(self, name: &str, available: Decimal) -> Self {
        lock(&self.balances).insert(name.to_string(), available);
        self
    }

    /// What `/user/account/info` reports for `name`
    pub fn with_account(self, name: &str, account_id: &str, vault: u64) -> Self {
        lock(&self.accounts).insert(name.to_string(), (account_id.to_string(), Some(vault.to_string())));
        self
    }

    pub fn with_position(self, name: &str, market: &str, side: PositionSide, size: Decimal) -> Self {
        lock(&self.positions).entry(name.to_string()).or_default().push(Position {
            market: market.to_string(),
            side,
            size,
            leverage: None,
            open_price: None,
            mark_price: None,
            unrealised_pnl: None,
        });
        self
    }

    pub fn with_book(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.book = (bid, ask);
        self
    }

    pub fn with_market_failure(mut self) -> Self {
        self.market_fails = true;
        self
    }

    pub fn with_balance_failure(self) -> Self {
        self.balance_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_transfer_failure(mut self) -> Self {
        self.transfer_fails = true;
        self
    }

    /// Reject the next order of `name` with `message`; stackable
    pub fn with_order_failure(self, name: &str, message: &str) -> Self {
        lock(&self.order_failures)
            .entry(name.to_string())
            .or_default()
            .push_back(message.to_string());
        self
    }

    pub fn set_balance_failure(&self, fail: bool) {
        self.balance_fails.store(fail, Ordering::SeqCst);
    }

    pub fn available(&self, name: &str) -> Decimal {
        lock(&self.balances).get(name).copied().unwrap_or(self.default_balance)
    }

    pub fn open_positions(&self, name: &str) -> Vec<Position> {
        lock(&self.positions).get(name).cloned().unwrap_or_default()
    }

    pub fn orders_of(&self, name: &str) -> Vec<SignedOrder> {
        lock(&self.submitted)
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, order)| order.clone())
            .collect()
    }

    fn api_key_for_account(&self, account_id: &str) -> String {
        lock(&self.accounts)
            .iter()
            .find(|(_, (id, _))| id == account_id)
            .map(|(key, _)| key.clone())
            .unwrap_or_else(|| account_id.to_string())
    }

    fn apply_fill(&self, name: &str, order: &SignedOrder) {
        let qty: Decimal = order.qty.parse().unwrap_or(Decimal::ZERO);
        let mut positions = lock(&self.positions);
        let book = positions.entry(name.to_string()).or_default();
        if order.reduce_only {
            for pos in book.iter_mut().filter(|p| p.market == order.market) {
                if pos.side.closing_side() == order.side {
                    pos.size = (pos.size - qty).max(Decimal::ZERO);
                }
            }
            book.retain(|p| p.size > Decimal::ZERO);
        } else {
            let side = match order.side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            };
            match book.iter_mut().find(|p| p.market == order.market && p.side == side) {
                Some(pos) => pos.size += qty,
                None => book.push(Position {
                    market: order.market.clone(),
                    side,
                    size: qty,
                    leverage: None,
                    open_price: order.price.parse().ok(),
                    mark_price: None,
                    unrealised_pnl: None,
                }),
            }
        }
    }
}

impl Default for MockExtendedApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtendedApi for MockExtendedApi {
    async fn market(&self, market: &str) -> Result<MarketMetadata> {
        if self.market_fails {
            return Err(AppError::external("extended", Some(503), "markets unavailable"));
        }
        Ok(MarketMetadata {
            market: market.to_string(),
            min_order_size: dec!(0.001),
            min_order_size_change: dec!(0.001),
            min_price_change: dec!(0.1),
            qty_decimals: 3,
            price_decimals: 1,
            ask_price: Some(self.book.1),
            bid_price: Some(self.book.0),
            last_price: Some(self.book.1),
            collateral_asset_id: "0x1".into(),
            synthetic_asset_id: "0x4254432d3600000000000000000000".into(),
            collateral_resolution: dec!(1000000),
            synthetic_resolution: dec!(1000000),
        })
    }

    async fn fees(&self, _creds: &ApiCredentials, market: &str) -> Result<FeeSchedule> {
        Ok(FeeSchedule {
            market: market.to_string(),
            maker_fee_rate: dec!(0.0002),
            taker_fee_rate: dec!(0.0005),
        })
    }

    async fn starknet_domain(&self) -> Result<StarknetDomain> {
        Ok(test_domain())
    }

    async fn balance(&self, creds: &ApiCredentials) -> Result<Balance> {
        self.balance_calls.fetch_add(1, Ordering::Relaxed);
        if self.balance_fails.load(Ordering::SeqCst) {
            return Err(AppError::external("extended", Some(500), "balance unavailable"));
        }
        Ok(balance_of(self.available(&creds.api_key)))
    }

    async fn account_info(&self, creds: &ApiCredentials) -> Result<AccountInfo> {
        self.account_info_calls.fetch_add(1, Ordering::Relaxed);
        let (account_id, vault) = lock(&self.accounts)
            .get(&creds.api_key)
            .cloned()
            .unwrap_or_else(|| (creds.api_key.clone(), None));
        Ok(AccountInfo {
            status: Some("ACTIVE".into()),
            l2_key: Some(creds.public_key.clone()),
            l2_vault: vault,
            account_id: Some(account_id),
        })
    }

    async fn positions(&self, creds: &ApiCredentials) -> Result<Vec<Position>> {
        Ok(self.open_positions(&creds.api_key))
    }

    async fn open_orders(&self, _creds: &ApiCredentials) -> Result<Vec<OpenOrder>> {
        Ok(Vec::new())
    }

    async fn set_leverage(&self, _creds: &ApiCredentials, _market: &str, _leverage: u32) -> Result<bool> {
        self.leverage_calls.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn submit_order(&self, creds: &ApiCredentials, order: &SignedOrder) -> Result<OrderAck> {
        self.order_count.fetch_add(1, Ordering::Relaxed);
        let failure = lock(&self.order_failures)
            .get_mut(&creds.api_key)
            .and_then(VecDeque::pop_front);
        if let Some(message) = failure {
            return Err(AppError::external("extended", Some(400), message));
        }

        self.apply_fill(&creds.api_key, order);
        lock(&self.submitted).push((creds.api_key.clone(), order.clone()));
        Ok(OrderAck {
            id: order.id.clone(),
            status: "PENDING".into(),
        })
    }

    async fn cancel_order(&self, _creds: &ApiCredentials, _order_id: &str) -> Result<()> {
        Ok(())
    }

    async fn tickers(&self, asset: Option<&str>) -> Result<Vec<Ticker>> {
        Ok(vec![Ticker {
            symbol: asset.unwrap_or("BTC-USD").to_string(),
            bid_price: Some(self.book.0),
            ask_price: Some(self.book.1),
            last_price: Some(self.book.1),
        }])
    }

    async fn available_markets(&self) -> Result<Vec<String>> {
        Ok(vec!["BTC-USD".into(), "ETH-USD".into()])
    }

    async fn transfer(&self, _creds: &ApiCredentials, request: &TransferRequest) -> Result<()> {
        self.transfer_count.fetch_add(1, Ordering::Relaxed);
        if self.transfer_fails {
            return Err(AppError::external("extended", Some(400), "transfer rejected"));
        }
        let amount: Decimal = request
            .amount
            .parse()
            .map_err(|_| AppError::data("amount", request.amount.clone()))?;
        let from = self.api_key_for_account(&request.from_account);
        let to = self.api_key_for_account(&request.to_account);
        let (from_balance, to_balance) = (self.available(&from), self.available(&to));
        {
            let mut balances = lock(&self.balances);
            balances.insert(from, from_balance - amount);
            balances.insert(to, to_balance + amount);
        }
        lock(&self.transfers).push(request.clone());
        Ok(())
    }
}

// =============================================================================
// Credential / status store
// =============================================================================

/// Store holding two slots for one user; `bot_running` can be scripted to
/// flip after a number of reads.
pub struct MockStore {
    slots: Mutex<HashMap<Slot, StoredCredentials>>,
    config: Option<UserBotConfig>,
    running: AtomicBool,
    /// `is_running` answers false once this many reads happened
    stop_after: Option<u64>,
    pub running_reads: Arc<AtomicU64>,
    pub saved_references: Mutex<Vec<(Slot, String, u64)>>,
    pub status_writes: Mutex<Vec<bool>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            config: None,
            running: AtomicBool::new(true),
            stop_after: None,
            running_reads: Arc::new(AtomicU64::new(0)),
            saved_references: Mutex::new(Vec::new()),
            status_writes: Mutex::new(Vec::new()),
        }
    }

    /// Slot with a plain private key and no cached account reference
    pub fn with_slot(self, slot: Slot, name: &str) -> Self {
        let creds = MockExtendedApi::creds(name);
        self.with_stored(
            slot,
            StoredCredentials {
                api_key: Some(creds.api_key),
                public_key: Some(creds.public_key),
                private_key: Some(Value::String(creds.private_key)),
                account_id: None,
                vault_id: None,
            },
        )
    }

    pub fn with_stored(self, slot: Slot, stored: StoredCredentials) -> Self {
        lock(&self.slots).insert(slot, stored);
        self
    }

    pub fn with_config(mut self, config: UserBotConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn stopped(self) -> Self {
        self.running.store(false, Ordering::SeqCst);
        self
    }

    pub fn stop_after(mut self, reads: u64) -> Self {
        self.stop_after = Some(reads);
        self
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MockStore {
    async fn credentials(&self, _user_id: &str, _wallet: &str, slot: Slot) -> Result<Option<StoredCredentials>> {
        Ok(lock(&self.slots).get(&slot).cloned())
    }

    async fn save_account_reference(
        &self,
        _user_id: &str,
        _wallet: &str,
        slot: Slot,
        account_id: &str,
        vault_id: u64,
    ) -> Result<()> {
        lock(&self.saved_references).push((slot, account_id.to_string(), vault_id));
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MockStore {
    async fn bot_config(&self, _user_id: &str, _wallet: &str) -> Result<Option<UserBotConfig>> {
        Ok(self.config.clone())
    }

    async fn is_running(&self, _user_id: &str, _wallet: &str) -> Result<bool> {
        let reads = self.running_reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stop_after.is_some_and(|limit| reads > limit) {
            return Ok(false);
        }
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn set_running(&self, _user_id: &str, _wallet: &str, running: bool) -> Result<()> {
        self.running.store(running, Ordering::SeqCst);
        lock(&self.status_writes).push(running);
        Ok(())
    }
}

// =============================================================================
// Micro venue
// =============================================================================

/// Venue filling every IOC at the requested price against a USDC wallet
pub struct MockVenue {
    book: Mutex<Option<BookTop>>,
    usdc: Mutex<Decimal>,
    should_fail: bool,
    balance_failures: AtomicU64,
    pub fills: Mutex<Vec<(bool, Decimal, Decimal)>>,
    pub order_count: Arc<AtomicU64>,
}

impl MockVenue {
    pub fn new(bid: Decimal, ask: Decimal, usdc: Decimal) -> Self {
        Self {
            book: Mutex::new(Some(BookTop { bid, ask })),
            usdc: Mutex::new(usdc),
            should_fail: false,
            balance_failures: AtomicU64::new(0),
            fills: Mutex::new(Vec::new()),
            order_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_failure(bid: Decimal, ask: Decimal, usdc: Decimal) -> Self {
        let mut venue = Self::new(bid, ask, usdc);
        venue.should_fail = true;
        venue
    }

    pub fn set_book(&self, bid: Decimal, ask: Decimal) {
        *lock(&self.book) = Some(BookTop { bid, ask });
    }

    pub fn usdc(&self) -> Decimal {
        *lock(&self.usdc)
    }

    /// Fail the next `reads` balance reads, as a timed-out snapshot would
    pub fn fail_balance_reads(&self, reads: u64) {
        self.balance_failures.store(reads, Ordering::SeqCst);
    }

    pub fn balance_failures(&self) -> u64 {
        self.balance_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MicroVenue for MockVenue {
    async fn book(&self) -> Option<BookTop> {
        *lock(&self.book)
    }

    async fn usdc_balance(&self) -> Result<Decimal> {
        let pending = self
            .balance_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(AppError::external("hyperliquid", None, "No balance snapshot received"));
        }
        Ok(self.usdc())
    }

    async fn place_ioc(&self, is_buy: bool, price: Decimal, size: Decimal) -> Result<()> {
        self.order_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail {
            return Err(AppError::external("hyperliquid", None, "Order could not immediately match"));
        }
        let notional = price * size;
        {
            let mut usdc = lock(&self.usdc);
            *usdc = if is_buy { *usdc - notional } else { *usdc + notional };
        }
        lock(&self.fills).push((is_buy, price, size));
        Ok(())
    }
}
