//! Numeric and hex helpers shared by the order and transfer builders.
//!
//! Exchange metadata arrives as JSON strings or numbers; everything here
//! works on `rust_decimal::Decimal` so tick rounding stays exact.

use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Num;
use rust_decimal::prelude::*;
use serde_json::Value;

use crate::error::{AppError, Result};

/// Rounding direction for `round_to_increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    Up,
    Down,
}

/// Parse a decimal string, accepting scientific notation (`1e-4`).
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .ok()
        .or_else(|| Decimal::from_scientific(trimmed).ok())
}

/// Read a numeric field from an exchange response.
///
/// Numbers and numeric strings are accepted. Empty strings, unparseable
/// text and missing values fail with a `Data` error naming `field`.
pub fn parse_number_from_api(value: Option<&Value>, field: &str) -> Result<Decimal> {
    match value {
        Some(Value::Number(n)) => parse_decimal(&n.to_string())
            .ok_or_else(|| AppError::data(field, format!("Invalid numeric value for {}", field))),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(AppError::data(field, format!("Empty string received for {}", field)));
            }
            parse_decimal(trimmed)
                .ok_or_else(|| AppError::data(field, format!("Unable to parse {}: {}", field, s)))
        }
        _ => Err(AppError::data(field, format!("Missing {} in exchange response", field))),
    }
}

/// Digits after the decimal point of an increment written as a string.
///
/// `"0.0001"` and `"1e-4"` both give 4.
pub fn decimal_places_str(value: &str) -> u32 {
    let value = value.trim();
    if value.is_empty() {
        return 0;
    }

    let lower = value.to_ascii_lowercase();
    if let Some((_, exponent)) = lower.split_once("e-") {
        return exponent.parse::<u32>().unwrap_or(0);
    }

    match value.split_once('.') {
        Some((_, fraction)) => fraction.len() as u32,
        None => 0,
    }
}

/// Decimal places of a float increment, using its shortest round-trip form.
pub fn decimal_places_f64(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    decimal_places_str(&value.to_string())
}

/// Decimal places of a JSON increment field (string or number).
pub fn decimal_places(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::String(s)) => decimal_places_str(s),
        Some(Value::Number(n)) => decimal_places_str(&n.to_string()),
        _ => 0,
    }
}

/// Snap `value` to a multiple of `increment`, never returning less than one
/// increment. A non-positive increment leaves the value untouched.
///
/// `None` when the quotient or product leaves the `Decimal` range.
pub fn round_to_increment(value: Decimal, increment: Decimal, mode: RoundMode) -> Option<Decimal> {
    if increment <= Decimal::ZERO {
        return Some(value);
    }

    let ratio = value.checked_div(increment)?;
    let mut factor = match mode {
        RoundMode::Up => ratio.ceil(),
        RoundMode::Down => ratio.floor(),
    };
    if factor <= Decimal::ZERO {
        factor = Decimal::ONE;
    }

    factor.checked_mul(increment)
}

/// Fixed-point rendering with exactly `decimals` digits.
pub fn format_with_decimals(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", decimals as usize, rounded)
}

/// Render a ratio (fee rate) with at most 10 decimals and no trailing zeros.
pub fn format_ratio(value: Decimal) -> String {
    let trimmed = value.round_dp(10).normalize();
    if trimmed.is_zero() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Prefix with `0x`; an empty input or a bare prefix becomes `0x0`.
pub fn ensure_hex_prefix(value: &str) -> String {
    let digits = strip_hex_prefix(value);
    if digits.is_empty() {
        return "0x0".to_string();
    }
    format!("0x{}", digits)
}

/// Left-pad an (optionally prefixed) hex string with zeros to 64 characters.
pub fn pad_hex_to_64(value: &str) -> String {
    format!("{:0>64}", strip_hex_prefix(value))
}

/// Normalize an asset identifier (number, hex string or decimal string)
/// into a `0x`-prefixed hex string.
pub fn normalize_asset_id_hex(value: Option<&Value>, field: &str) -> Result<String> {
    match value {
        Some(Value::Number(n)) => {
            let id = n
                .as_u64()
                .ok_or_else(|| AppError::data(field, format!("Invalid asset identifier: {}", n)))?;
            Ok(ensure_hex_prefix(&format!("{:x}", id)))
        }
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
                return Ok(ensure_hex_prefix(trimmed));
            }
            let id = BigUint::from_str_radix(trimmed, 10)
                .map_err(|_| AppError::data(field, format!("Invalid asset identifier: {}", s)))?;
            Ok(ensure_hex_prefix(&id.to_str_radix(16)))
        }
        _ => Err(AppError::data(field, "Asset identifier missing in market metadata")),
    }
}

/// Big-integer conversion of a hex string to decimal; empty input gives "0".
pub fn hex_to_decimal_string(hex: &str) -> Result<String> {
    let sanitized = strip_hex_prefix(hex);
    if sanitized.is_empty() {
        return Ok("0".to_string());
    }
    BigUint::from_str_radix(sanitized, 16)
        .map(|n| n.to_str_radix(10))
        .map_err(|e| AppError::Validation(format!("Invalid hex string '{}': {}", hex, e)))
}
