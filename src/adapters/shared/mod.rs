//! Shared helpers for exchange adapters
//!
//! WebSocket connection setup and reconnection backoff used by the
//! Hyperliquid market-data streams.

pub mod reconnect;
pub mod websocket;

pub use reconnect::{backoff_delay, reconnect_with_backoff, ReconnectConfig};
pub use websocket::{connect_tls, TlsWebSocketStream};
