//! One-shot manual operation on the configured sub-account pair
//!
//! ⚠️ WARNING: `open` and `close` place REAL orders on Extended mainnet.
//!
//! Usage:
//! ```bash
//! cargo run --bin open_pair -- status
//! cargo run --bin open_pair -- rebalance
//! cargo run --bin open_pair -- open
//! cargo run --bin open_pair -- close
//! ```
//!
//! Requires `config.yaml` (or `CONFIG_PATH`) and the credential store
//! variables `SUPABASE_URL`, `SUPABASE_SERVICE_KEY`, optionally `BOX_SECRET_KEY`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info};

use dn_bot::adapters::extended::{ExtendedClient, ExtendedConfig, OrderRequest, StarkSigningOracle};
use dn_bot::adapters::store::SupabaseStore;
use dn_bot::adapters::types::{OrderAck, OrderSide};
use dn_bot::config::{self, SupabaseConfig};
use dn_bot::core::{
    init_logging, retry, AccountOps, PairRebalance, Rebalancer, RetryPolicy, SessionLoader,
    TradingAccount,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    let path = PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string()));
    let config = config::load_config(&path)?;

    let supabase = SupabaseConfig::from_env()?.context("SUPABASE_URL is not set")?;
    let store = Arc::new(SupabaseStore::new(&supabase)?);
    let oracle = StarkSigningOracle::shared();
    let api = Arc::new(ExtendedClient::new(
        ExtendedConfig::new(&config.extended.base_url),
        Arc::clone(&oracle),
    ));

    let pair = SessionLoader::new(store, api.clone(), config.user.clone(), supabase.box_secret_key.clone())
        .load_pair()
        .await?;
    let ops = AccountOps::new(api.clone(), Arc::clone(&oracle));
    let rebalancer = Rebalancer::new(api, oracle, config.rebalance.clone());
    let hook = PairRebalance {
        rebalancer: &rebalancer,
        pair: &pair,
    };
    let market = config.cycle.market.as_str();

    match command.as_str() {
        "status" => {
            for account in [&pair.a, &pair.b] {
                let snapshot = ops.snapshot(account).await?;
                info!(
                    account = %account.label(),
                    available = %snapshot.balance.available_for_trade,
                    equity = %snapshot.balance.equity,
                    positions = snapshot.positions.len(),
                    open_orders = snapshot.orders.len(),
                    "Account status"
                );
                for position in &snapshot.positions {
                    info!(
                        account = %account.label(),
                        market = %position.market,
                        side = ?position.side,
                        size = %position.size,
                        "Open position"
                    );
                }
            }
        }
        "rebalance" => {
            let result = rebalancer.rebalance(&pair).await?;
            info!(action = %result.action, amount = %result.amount, "Rebalance finished");
        }
        "open" => {
            let leg = |side| {
                OrderRequest::market(market, side, None)
                    .with_leverage(config.cycle.leverage)
                    .with_slippage(config.cycle.slippage_bps)
            };
            let (long_request, short_request) = (leg(OrderSide::Buy), leg(OrderSide::Sell));
            let (long, short) = tokio::join!(
                open_leg(&ops, &hook, &pair.a, &long_request),
                open_leg(&ops, &hook, &pair.b, &short_request),
            );
            match (&long, &short) {
                (Ok(a), Ok(b)) => info!(long = %a.id, short = %b.id, "Both legs opened"),
                _ => {
                    error!(long = ?long.as_ref().err(), short = ?short.as_ref().err(), "Pair not fully opened");
                    bail!("open failed, check positions with `open_pair status`");
                }
            }
        }
        "close" => {
            let policy = RetryPolicy::orders();
            let (a, b) = tokio::join!(
                ops.close_positions(&pair.a, market, &policy, Some(&hook)),
                ops.close_positions(&pair.b, market, &policy, Some(&hook)),
            );
            let closed = a?.len() + b?.len();
            info!(market = %market, closed, "Positions closed");
        }
        other => bail!("unknown command `{}` (expected status, rebalance, open or close)", other),
    }

    Ok(())
}

async fn open_leg(
    ops: &AccountOps,
    hook: &PairRebalance<'_>,
    account: &TradingAccount,
    request: &OrderRequest,
) -> dn_bot::Result<OrderAck> {
    retry(&RetryPolicy::orders(), "manual open", Some(hook), move || async move {
        ops.open_market_order(account, request).await.into_result()
    })
    .await
}
