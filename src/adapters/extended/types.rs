//! Extended response envelopes
//!
//! The API answers `{ "status": "OK", "data": ... }` for most endpoints, but
//! a few return bare objects, single-element lists or `tickers` arrays.
//! These helpers normalize every known shape and fail with a `Data` error
//! when none matches.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};

/// True when the envelope reports `status == "OK"`
pub fn is_ok(payload: &Value) -> bool {
    payload
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.eq_ignore_ascii_case("ok"))
        .unwrap_or(false)
}

/// `payload.data`, or the payload itself when there is no envelope
pub fn data_or_self(payload: &Value) -> &Value {
    match payload.get("data") {
        Some(data) if !data.is_null() => data,
        _ => payload,
    }
}

/// First element of `data` when it is a list, `data` itself when it is an object
pub fn first_entry<'a>(payload: &'a Value, field: &str) -> Result<&'a Value> {
    match data_or_self(payload) {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| AppError::data(field, format!("Empty {} list", field))),
        obj @ Value::Object(_) => Ok(obj),
        _ => Err(AppError::data(field, format!("Unexpected {} response shape", field))),
    }
}

/// `data` as a list; a null or absent `data` is an empty list
pub fn data_list<T: DeserializeOwned>(payload: &Value, field: &str) -> Result<Vec<T>> {
    let items = match payload.get("data") {
        None | Some(Value::Null) if !payload.is_array() => return Ok(Vec::new()),
        Some(data) => data,
        None => payload,
    };
    match items {
        Value::Array(_) => serde_json::from_value(items.clone())
            .map_err(|e| AppError::data(field, e.to_string())),
        _ => Err(AppError::data(field, format!("Expected a list of {}", field))),
    }
}

/// Deserialize `data` (or the bare payload) into `T`
pub fn parse_data<T: DeserializeOwned>(payload: &Value, field: &str) -> Result<T> {
    serde_json::from_value(data_or_self(payload).clone())
        .map_err(|e| AppError::data(field, e.to_string()))
}

/// Ticker lists come as `tickers`, `data` (list or single object) or a bare list
pub fn ticker_values(payload: &Value) -> Result<Vec<Value>> {
    if let Some(Value::Array(items)) = payload.get("tickers") {
        return Ok(items.clone());
    }
    match data_or_self(payload) {
        Value::Array(items) => Ok(items.clone()),
        obj @ Value::Object(_) if obj.get("status").is_none() => Ok(vec![obj.clone()]),
        _ => Err(AppError::data("tickers", "Unexpected ticker response shape")),
    }
}

/// Human-readable rejection reason: `error` (string or `{code, message}`),
/// then `message`.
pub fn error_message(payload: &Value) -> Option<String> {
    match payload.get("error") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Object(err)) => {
            let message = err.get("message").and_then(Value::as_str).unwrap_or_default();
            return Some(match err.get("code") {
                Some(code) if !code.is_null() => format!("code {}: {}", code, message),
                _ => message.to_string(),
            });
        }
        _ => {}
    }
    payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read an id that may be a number or a string
pub fn id_field(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::Position;
    use serde_json::json;

    #[test]
    fn test_is_ok() {
        assert!(is_ok(&json!({"status": "OK"})));
        assert!(!is_ok(&json!({"status": "ERROR"})));
        assert!(!is_ok(&json!({})));
    }

    #[test]
    fn test_first_entry_shapes() {
        let list = json!({"status": "OK", "data": [{"name": "BTC-USD"}]});
        assert_eq!(first_entry(&list, "markets").unwrap()["name"], "BTC-USD");

        let bare = json!({"name": "ETH-USD"});
        assert_eq!(first_entry(&bare, "markets").unwrap()["name"], "ETH-USD");

        let empty = json!({"status": "OK", "data": []});
        assert!(matches!(first_entry(&empty, "markets"), Err(AppError::Data { .. })));
    }

    #[test]
    fn test_data_list() {
        let payload = json!({"status": "OK", "data": [
            {"market": "BTC-USD", "side": "LONG", "size": "0.01"}
        ]});
        let positions: Vec<Position> = data_list(&payload, "positions").unwrap();
        assert_eq!(positions.len(), 1);

        let none: Vec<Position> = data_list(&json!({"status": "OK", "data": null}), "positions").unwrap();
        assert!(none.is_empty());

        let bad = data_list::<Position>(&json!({"data": {"x": 1}}), "positions");
        assert!(bad.is_err());
    }

    #[test]
    fn test_ticker_values_shapes() {
        assert_eq!(ticker_values(&json!({"tickers": [{"symbol": "BTC"}]})).unwrap().len(), 1);
        assert_eq!(ticker_values(&json!({"data": [{"asset": "BTC"}, {"asset": "ETH"}]})).unwrap().len(), 2);
        assert_eq!(ticker_values(&json!({"data": {"symbol": "BTC"}})).unwrap().len(), 1);
        assert!(ticker_values(&json!("nope")).is_err());
    }

    #[test]
    fn test_error_message_variants() {
        let nested = json!({"status": "ERROR", "error": {"code": 1140, "message": "New order cost exceeds available balance"}});
        assert_eq!(
            error_message(&nested).unwrap(),
            "code 1140: New order cost exceeds available balance"
        );
        assert_eq!(error_message(&json!({"error": "bad"})).unwrap(), "bad");
        assert_eq!(error_message(&json!({"message": "oops"})).unwrap(), "oops");
        assert!(error_message(&json!({"status": "OK"})).is_none());
    }

    #[test]
    fn test_id_field() {
        assert_eq!(id_field(Some(&json!(123))).as_deref(), Some("123"));
        assert_eq!(id_field(Some(&json!("abc"))).as_deref(), Some("abc"));
        assert_eq!(id_field(Some(&json!(""))), None);
        assert_eq!(id_field(None), None);
    }
}
