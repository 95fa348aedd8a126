//! Core module - numeric helpers, logging, sizing, retry, rebalancing,
//! session loading, account operations and the two trading loops
//!
//! This module uses **explicit re-exports** instead of glob exports
//! (`pub use module::*`) so the public API only changes on purpose.
//!
//! ## Usage
//! Prefer importing from `crate::core`:
//! ```ignore
//! use dn_bot::core::{BotSession, Rebalancer, SessionLoader};
//! ```

pub mod cycle;
pub mod humanizer;
pub mod logging;
pub mod numeric;
pub mod rebalance;
pub mod retry;
pub mod session;
pub mod sizing;
pub mod trading;

// Explicit re-exports for logging module
pub use logging::{
    init_logging, init_logging_with_config, sanitize, sanitize_signature, LoggingConfig,
    SanitizedValue, DEFAULT_LOG_LEVEL, SENSITIVE_FIELD_PATTERNS,
};

// Explicit re-exports for numeric module
pub use numeric::{
    decimal_places, ensure_hex_prefix, format_with_decimals, pad_hex_to_64, round_to_increment,
    strip_hex_prefix, RoundMode,
};

// Explicit re-exports for sizing module
pub use sizing::{MaxSize, MaxSizeCalculator};

// Explicit re-exports for retry module
pub use retry::{retry, RebalanceHook, RetryPolicy};

// Explicit re-exports for rebalance module
pub use rebalance::{
    plan_rebalance, PairBalances, PairRebalance, RebalanceAction, RebalanceResult, Rebalancer,
};

// Explicit re-exports for session module
pub use session::{AccountPair, SessionLoader, TradingAccount};

// Explicit re-exports for trading module
pub use trading::{AccountOps, AccountSnapshot, OrderOutcome};

// Explicit re-exports for cycle module
pub use cycle::{BotSession, CycleState, CycleTimings, IterationOutcome};

// Explicit re-exports for humanizer module
pub use humanizer::{CycleStatus, Humanizer, TradingCycle};
