//! Delta-neutral trading bot for Extended and Hyperliquid
//!
//! - `adapters`: Extended REST + Stark signing, Hyperliquid venue, credential store
//! - `core`: sizing, retry, rebalancing, session loading, the cycle loop and the humanizer
//! - `config`: YAML configuration and env-overridable constants

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;

pub use error::{AppError, Result};
