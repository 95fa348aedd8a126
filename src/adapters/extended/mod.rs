//! Extended Exchange Adapter
//!
//! REST client, request authentication and the signed order/transfer
//! builders for the Extended StarkNet perpetuals exchange.
//!
//! This module is organized into submodules:
//! - `config` - Base URL, user agent and timeouts
//! - `types` - Response envelope normalization
//! - `signing` - Stark key, order and transfer hashes (SNIP-12 rev 1)
//! - `auth` - Per-request signature headers
//! - `client` - `ExtendedApi` implementation
//! - `order` - Market order payload builder
//! - `transfer` - Inter-account transfer builder

mod auth;
mod client;
mod config;
pub mod order;
pub mod signing;
pub mod transfer;
mod types;

pub use auth::{build_auth_headers, request_message_hash, sign_request};
pub use client::ExtendedClient;
pub use config::ExtendedConfig;
pub use order::{compose_order, OrderBuilder, OrderInputs, OrderRequest};
pub use signing::{OrderHashParams, SigningOracle, StarkSigningOracle, TransferHashParams};
pub use transfer::{compose_transfer, TransferBuilder, TransferEndpoint};
