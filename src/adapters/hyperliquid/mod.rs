//! Hyperliquid Venue
//!
//! Market data over WebSocket (`l2Book`, `webData2`) and signed IOC orders
//! for the randomized micro-cycle mode.
//!
//! This module is organized into submodules:
//! - `config` - Endpoints and snapshot timeout
//! - `types` - Channel payloads and order response parsing
//! - `signing` - msgpack action hash, EIP-712 agent signature, precision rules
//! - `ws` - One-shot snapshots and the persistent `PriceFeed`
//! - `client` - `MicroVenue` implementation and IOC fallback ladder

mod client;
mod config;
pub mod signing;
mod types;
mod ws;

pub use client::{place_ioc_with_fallback, HyperliquidVenue};
pub use config::HyperliquidConfig;
pub use signing::{format_price, format_size, BuilderInfo};
pub use types::{BookTop, UserSnapshot};
pub use ws::{fetch_user_snapshot, top_of_book, user_snapshot, PriceFeed};
