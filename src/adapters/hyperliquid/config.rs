//! Hyperliquid Configuration
//!
//! Endpoints for market-data streams and signed exchange actions.

use std::time::Duration;

use crate::config::constants;

const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";
const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

#[derive(Debug, Clone)]
pub struct HyperliquidConfig {
    /// Use production endpoints
    pub production: bool,
    /// Overrides the REST base URL (tests)
    pub api_url: Option<String>,
    /// Overrides the WebSocket URL (tests)
    pub ws_override: Option<String>,
    pub snapshot_timeout: Duration,
}

impl Default for HyperliquidConfig {
    fn default() -> Self {
        Self {
            production: true,
            api_url: None,
            ws_override: None,
            snapshot_timeout: constants::ws_snapshot_timeout(),
        }
    }
}

impl HyperliquidConfig {
    pub fn new(production: bool) -> Self {
        Self {
            production,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let production = std::env::var("HYPERLIQUID_PRODUCTION")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        Self::new(production)
    }

    pub fn ws_url(&self) -> &str {
        if let Some(url) = &self.ws_override {
            return url;
        }
        if self.production {
            MAINNET_WS_URL
        } else {
            TESTNET_WS_URL
        }
    }

    /// `POST /exchange` endpoint for signed actions
    pub fn exchange_url(&self) -> String {
        let base = self.api_url.as_deref().unwrap_or(if self.production {
            MAINNET_API_URL
        } else {
            TESTNET_API_URL
        });
        format!("{}/exchange", base.trim_end_matches('/'))
    }
}
