//! External boundaries: Extended, Hyperliquid and the credential store
//!
//! - `extended`: REST client, Stark signing, order and transfer builders
//! - `hyperliquid`: WebSocket market data and the signed IOC venue
//! - `store`: credential store and key envelope decryption

pub mod errors;
pub mod extended;
pub mod hyperliquid;
pub mod shared;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types for convenience
pub use errors::{ExchangeError, ExchangeResult};
pub use traits::{ExtendedApi, MicroVenue};
pub use types::{ApiCredentials, Balance, OrderSide, Position, PositionSide};
