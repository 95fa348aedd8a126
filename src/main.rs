//! dn_bot entry point
//!
//! ```bash
//! dn_bot              # delta-neutral loop on the two Extended sub-accounts
//! dn_bot humanizer    # randomized micro-cycles on Hyperliquid
//! ```
//!
//! Configuration comes from `config.yaml` (or `CONFIG_PATH`), secrets from
//! the environment (`.env` is loaded when present).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dn_bot::adapters::extended::{ExtendedClient, ExtendedConfig, StarkSigningOracle};
use dn_bot::adapters::hyperliquid::{HyperliquidConfig, HyperliquidVenue, PriceFeed};
use dn_bot::adapters::store::{StatusStore, SupabaseStore};
use dn_bot::config::{self, constants, AppConfig, SupabaseConfig};
use dn_bot::core::{init_logging, AccountOps, BotSession, Humanizer, Rebalancer, SessionLoader};

/// `BTC` and `BTC-USD` both name the BTC-USD market
fn market_for_asset(asset: &str) -> String {
    let asset = asset.trim().to_ascii_uppercase();
    if asset.contains('-') {
        asset
    } else {
        format!("{}-USD", asset)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    info!("dn_bot starting");
    constants::log_configuration();

    let path = PathBuf::from(std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string()));
    let config = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(path = %path.display(), error = %e, "[CONFIG] Configuration failed");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                let _ = shutdown_signal.send(());
            }
            Err(err) => error!(error = %err, "[SHUTDOWN] Failed to listen for Ctrl+C"),
        }
    });

    let token = CancellationToken::new();
    let bridge = token.clone();
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        bridge.cancel();
    });

    let humanizer_mode = std::env::args().nth(1).as_deref() == Some("humanizer");
    if humanizer_mode {
        run_humanizer(&config, token).await?;
    } else {
        run_delta_neutral(&config, token).await?;
    }

    info!("[SHUTDOWN] Clean exit");
    Ok(())
}

async fn run_delta_neutral(config: &AppConfig, token: CancellationToken) -> anyhow::Result<()> {
    let supabase = SupabaseConfig::from_env()?.context("SUPABASE_URL is required for the delta-neutral bot")?;
    let store = Arc::new(SupabaseStore::new(&supabase)?);
    let oracle = StarkSigningOracle::shared();
    let api = Arc::new(ExtendedClient::new(
        ExtendedConfig::new(&config.extended.base_url),
        Arc::clone(&oracle),
    ));

    let user = config.user.clone();
    let loader = SessionLoader::new(store.clone(), api.clone(), user.clone(), supabase.box_secret_key.clone());
    let pair = loader.load_pair().await?;

    let cycle = match store.bot_config(&user.user_id, &user.wallet_address).await {
        Ok(Some(stored)) => config.cycle.with_overrides(
            Some(market_for_asset(&stored.asset)),
            stored.leverage,
            stored.duration_cycle,
        ),
        Ok(None) => config.cycle.clone(),
        Err(e) => {
            warn!(error = %e, "[CONFIG] Could not read stored bot settings, using config file");
            config.cycle.clone()
        }
    };
    cycle.validate()?;
    info!(
        market = %cycle.market,
        leverage = cycle.leverage,
        hold_minutes = cycle.hold_minutes,
        "[CONFIG] Cycle settings"
    );

    store.set_running(&user.user_id, &user.wallet_address, true).await?;

    let bot = BotSession::new(
        user,
        pair,
        cycle,
        store,
        AccountOps::new(api.clone(), Arc::clone(&oracle)),
        Rebalancer::new(api, oracle, config.rebalance.clone()),
    );
    let completed = bot.run(token).await?;
    info!(completed, "[SHUTDOWN] Delta-neutral loop finished");
    Ok(())
}

async fn run_humanizer(config: &AppConfig, token: CancellationToken) -> anyhow::Result<()> {
    let settings = config
        .humanizer
        .clone()
        .context("humanizer section missing from configuration")?;
    let agent_key = std::env::var("HYPERLIQUID_AGENT_KEY").context("HYPERLIQUID_AGENT_KEY is not set")?;
    let user_address = std::env::var("HYPERLIQUID_USER_ADDRESS").context("HYPERLIQUID_USER_ADDRESS is not set")?;

    let hl_config = HyperliquidConfig::new(config.hyperliquid.production);
    let feed = PriceFeed::spawn(hl_config.clone(), &settings.coin, &token);
    let venue = Arc::new(HyperliquidVenue::new(
        hl_config,
        &agent_key,
        &user_address,
        &settings,
        Arc::clone(&feed),
    )?);

    // Cancelled by Ctrl+C, or by the humanizer itself when it stops or finishes
    let stopped = token.child_token();
    let humanizer = Humanizer::new(venue, settings, stopped.clone());
    let cycles = humanizer.start().await?;
    info!(cycles, "[HUMANIZER] Running, press Ctrl+C to stop");

    stopped.cancelled().await;
    humanizer.stop();
    feed.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_for_asset() {
        assert_eq!(market_for_asset("btc"), "BTC-USD");
        assert_eq!(market_for_asset("ETH-USD"), "ETH-USD");
    }
}
