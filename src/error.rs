//! Application-wide error types using thiserror
//!
//! Every fallible path in the crate resolves to `AppError`. The variants
//! follow the failure taxonomy the orchestrator reasons about: caller input,
//! stored configuration, response data, remote services and cryptography.

use thiserror::Error;

use crate::adapters::errors::ExchangeError;

/// Substrings the exchange uses when an order exceeds available collateral.
const BALANCE_ERROR_SIGNATURES: &[&str] = &[
    "1140",
    "exceeds available balance",
    "New order cost exceeds",
];

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing caller input (incl. incomplete market metadata)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or incomplete stored credentials/configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unparseable or missing field in an external response
    #[error("Data error ({field}): {message}")]
    Data { field: String, message: String },

    /// Non-2xx or unexpected answer from an external API
    #[error("{service} error{}: {message}", fmt_status(.status))]
    ExternalService {
        service: String,
        status: Option<u16>,
        message: String,
    },

    /// Signing, key derivation or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Shorthand for a `Data` error naming the offending field.
    pub fn data(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Data {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an `ExternalService` error.
    pub fn external(service: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::ExternalService {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// True when the message carries one of the exchange's
    /// insufficient-balance signatures.
    pub fn is_balance_error(&self) -> bool {
        is_balance_error_message(&self.to_string())
    }
}

/// Message-level check used by the retry wrapper.
pub fn is_balance_error_message(message: &str) -> bool {
    BALANCE_ERROR_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::HttpStatus { service, status, message } => {
                AppError::external(service, Some(status), message)
            }
            ExchangeError::InvalidResponse { field, message } => AppError::data(field, message),
            other => AppError::external("exchange", None, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        AppError::external("http", status, err.to_string())
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
