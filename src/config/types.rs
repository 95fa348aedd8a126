//! Configuration types for bot settings
//!
//! All structs are loaded from YAML and validated once at startup.
//! Per-user overrides (market, leverage, hold duration) can also come from
//! the status store, see [`CycleConfig::with_overrides`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DEFAULT_EXTENDED_URL: &str = "https://api.starknet.extended.exchange";

fn default_slippage_bps() -> Decimal {
    Decimal::from(75)
}

fn default_min_balance() -> Decimal {
    Decimal::from(20)
}

fn default_min_transfer() -> Decimal {
    Decimal::ONE
}

fn default_min_imbalance_pct() -> Decimal {
    Decimal::from(5)
}

fn default_transfer_asset() -> String {
    "USD".to_string()
}

fn default_max_cycles() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_extended_url() -> String {
    DEFAULT_EXTENDED_URL.to_string()
}

// ============================================================================
// Sections
// ============================================================================

/// Keys of the stored credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Discord id the credentials are stored under
    pub user_id: String,
    pub wallet_address: String,
}

/// Delta-neutral cycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Extended market, e.g. "BTC-USD"
    pub market: String,
    /// Leverage multiplier (1-100)
    pub leverage: u32,
    /// How long both legs are held, in minutes
    pub hold_minutes: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
    /// Minimum available-for-trade on each account before opening
    #[serde(default = "default_min_balance")]
    pub min_balance_usdc: Decimal,
}

impl CycleConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.market.trim().is_empty() {
            return Err(AppError::Config("cycle.market cannot be empty".to_string()));
        }
        if self.leverage < 1 || self.leverage > 100 {
            return Err(AppError::Config(format!(
                "cycle.leverage must be 1-100, got {}",
                self.leverage
            )));
        }
        if self.hold_minutes == 0 {
            return Err(AppError::Config("cycle.hold_minutes must be > 0".to_string()));
        }
        if self.slippage_bps < Decimal::ZERO || self.slippage_bps >= Decimal::from(10_000) {
            return Err(AppError::Config(format!(
                "cycle.slippage_bps must be in [0, 10000), got {}",
                self.slippage_bps
            )));
        }
        if self.min_balance_usdc < Decimal::ZERO {
            return Err(AppError::Config("cycle.min_balance_usdc cannot be negative".to_string()));
        }
        Ok(())
    }

    /// Apply the per-user settings persisted next to the bot status.
    pub fn with_overrides(
        &self,
        market: Option<String>,
        leverage: Option<u32>,
        hold_minutes: Option<u64>,
    ) -> Self {
        Self {
            market: market.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| self.market.clone()),
            leverage: leverage.filter(|l| (1..=100).contains(l)).unwrap_or(self.leverage),
            hold_minutes: hold_minutes.filter(|m| *m > 0).unwrap_or(self.hold_minutes),
            ..self.clone()
        }
    }
}

/// Rebalancer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Absolute floor: no transfer below `2 × min_transfer_amount` difference
    #[serde(default = "default_min_transfer")]
    pub min_transfer_amount: Decimal,
    /// Relative floor: no transfer below this share of the combined total
    #[serde(default = "default_min_imbalance_pct")]
    pub min_imbalance_pct: Decimal,
    #[serde(default = "default_transfer_asset")]
    pub asset: String,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_transfer_amount: default_min_transfer(),
            min_imbalance_pct: default_min_imbalance_pct(),
            asset: default_transfer_asset(),
        }
    }
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.min_transfer_amount <= Decimal::ZERO {
            return Err(AppError::Config(
                "rebalance.min_transfer_amount must be > 0".to_string(),
            ));
        }
        if self.min_imbalance_pct < Decimal::ZERO || self.min_imbalance_pct > Decimal::ONE_HUNDRED {
            return Err(AppError::Config(format!(
                "rebalance.min_imbalance_pct must be 0-100, got {}",
                self.min_imbalance_pct
            )));
        }
        Ok(())
    }
}

/// Hyperliquid builder-fee attribution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuilderKind {
    #[default]
    Based,
    Unit,
}

/// Randomized micro-cycle mode on Hyperliquid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizerConfig {
    /// Coin traded, e.g. "HYPE"
    pub coin: String,
    /// Asset index used in the order action
    pub market_index: u32,
    pub sz_decimals: u32,
    /// Spot market (price precision 8 − sz_decimals) instead of perps (6 − sz_decimals)
    #[serde(default)]
    pub spot: bool,
    pub budget_per_cycle: Decimal,
    /// Price move (percent of entry) that triggers an early sell
    pub max_variation_pct: Decimal,
    pub holding_min_minutes: u64,
    pub holding_max_minutes: u64,
    #[serde(default)]
    pub builder: BuilderKind,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
}

impl HumanizerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.coin.trim().is_empty() {
            return Err(AppError::Config("humanizer.coin cannot be empty".to_string()));
        }
        if self.budget_per_cycle <= Decimal::ZERO {
            return Err(AppError::Config("humanizer.budget_per_cycle must be > 0".to_string()));
        }
        if self.max_variation_pct <= Decimal::ZERO {
            return Err(AppError::Config("humanizer.max_variation_pct must be > 0".to_string()));
        }
        if self.holding_min_minutes > self.holding_max_minutes {
            return Err(AppError::Config(format!(
                "humanizer: holding_min_minutes ({}) must be <= holding_max_minutes ({})",
                self.holding_min_minutes, self.holding_max_minutes
            )));
        }
        if self.max_cycles == 0 {
            return Err(AppError::Config("humanizer.max_cycles must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedSettings {
    #[serde(default = "default_extended_url")]
    pub base_url: String,
}

impl Default for ExtendedSettings {
    fn default() -> Self {
        Self {
            base_url: default_extended_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperliquidSettings {
    #[serde(default = "default_true")]
    pub production: bool,
}

impl Default for HyperliquidSettings {
    fn default() -> Self {
        Self { production: true }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub user: UserConfig,
    pub cycle: CycleConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub humanizer: Option<HumanizerConfig>,
    #[serde(default)]
    pub extended: ExtendedSettings,
    #[serde(default)]
    pub hyperliquid: HyperliquidSettings,
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user.user_id.trim().is_empty() {
            return Err(AppError::Config("user.user_id cannot be empty".to_string()));
        }
        if self.user.wallet_address.trim().is_empty() {
            return Err(AppError::Config("user.wallet_address cannot be empty".to_string()));
        }
        if !self.extended.base_url.starts_with("http") {
            return Err(AppError::Config(format!(
                "extended.base_url must be an http(s) URL, got '{}'",
                self.extended.base_url
            )));
        }

        self.cycle.validate()?;
        self.rebalance.validate()?;
        if let Some(humanizer) = &self.humanizer {
            humanizer.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_cycle() -> CycleConfig {
        CycleConfig {
            market: "BTC-USD".to_string(),
            leverage: 10,
            hold_minutes: 30,
            slippage_bps: dec!(75),
            min_balance_usdc: dec!(20),
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            user: UserConfig {
                user_id: "123456789".to_string(),
                wallet_address: "0xabc".to_string(),
            },
            cycle: valid_cycle(),
            rebalance: RebalanceConfig::default(),
            humanizer: None,
            extended: ExtendedSettings::default(),
            hyperliquid: HyperliquidSettings::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_leverage_out_of_range() {
        let mut config = valid_config();
        config.cycle.leverage = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
        config.cycle.leverage = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_hold_rejected() {
        let mut config = valid_config();
        config.cycle.hold_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_user_rejected() {
        let mut config = valid_config();
        config.user.user_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rebalance_defaults() {
        let rebalance = RebalanceConfig::default();
        assert_eq!(rebalance.min_transfer_amount, dec!(1));
        assert_eq!(rebalance.min_imbalance_pct, dec!(5));
        assert_eq!(rebalance.asset, "USD");
    }

    #[test]
    fn test_humanizer_holding_window_order() {
        let mut config = valid_config();
        config.humanizer = Some(HumanizerConfig {
            coin: "HYPE".to_string(),
            market_index: 159,
            sz_decimals: 2,
            spot: false,
            budget_per_cycle: dec!(20),
            max_variation_pct: dec!(1.5),
            holding_min_minutes: 10,
            holding_max_minutes: 5,
            builder: BuilderKind::Based,
            max_cycles: 10,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_ignore_invalid_values() {
        let cycle = valid_cycle();
        let merged = cycle.with_overrides(Some("ETH-USD".into()), Some(0), Some(5));
        assert_eq!(merged.market, "ETH-USD");
        assert_eq!(merged.leverage, 10);
        assert_eq!(merged.hold_minutes, 5);

        let merged = cycle.with_overrides(Some(String::new()), None, Some(0));
        assert_eq!(merged.market, "BTC-USD");
        assert_eq!(merged.hold_minutes, 30);
    }
}
