//! Exchange boundary error types
//!
//! Transport-level failures raised by the REST and WebSocket clients.
//! They convert into `AppError` at the adapter edge.

use thiserror::Error;

/// Exchange-specific error types for adapter operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Connection to exchange failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP answer
    #[error("{service} returned {status}: {message}")]
    HttpStatus {
        service: String,
        status: u16,
        message: String,
    },

    /// Network operation timed out
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// Response did not match any known shape
    #[error("Invalid response ({field}): {message}")]
    InvalidResponse { field: String, message: String },

    /// Exchange accepted the request but rejected the order/action
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl ExchangeError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ExchangeError::InvalidResponse {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
