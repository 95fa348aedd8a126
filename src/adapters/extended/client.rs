//! Extended REST client
//!
//! Implements [`ExtendedApi`] over `reqwest`. Request bodies are serialized
//! once so the signed hash and the bytes on the wire always match.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use super::auth::{basic_headers, build_auth_headers};
use super::config::ExtendedConfig;
use super::signing::SigningOracle;
use super::types::{
    data_list, data_or_self, error_message, first_entry, id_field, is_ok, parse_data,
    ticker_values,
};
use crate::adapters::errors::ExchangeError;
use crate::adapters::traits::ExtendedApi;
use crate::adapters::types::{
    create_http_client, AccountInfo, ApiCredentials, Balance, FeeSchedule, MarketMetadata,
    OpenOrder, OrderAck, Position, SignedOrder, StarknetDomain, Ticker, TransferRequest,
};
use crate::core::logging::sanitize;
use crate::error::{AppError, Result};

const SERVICE: &str = "extended";

/// How a request is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// No API key (public market data)
    Public,
    /// `X-Api-Key` only
    ApiKey,
    /// API key plus Stark signature over the request
    Signed,
}

pub struct ExtendedClient {
    config: ExtendedConfig,
    http: reqwest::Client,
    oracle: Arc<dyn SigningOracle>,
}

impl ExtendedClient {
    pub fn new(config: ExtendedConfig, oracle: Arc<dyn SigningOracle>) -> Self {
        let http = create_http_client(SERVICE, config.request_timeout);
        Self {
            config,
            http,
            oracle,
        }
    }

    fn headers(
        &self,
        auth: Auth,
        creds: Option<&ApiCredentials>,
        endpoint: &str,
        method: &Method,
        body: Option<&str>,
    ) -> Result<HeaderMap> {
        match (auth, creds) {
            (Auth::Public, _) => basic_headers(None, &self.config.user_agent),
            (Auth::ApiKey, Some(creds)) => basic_headers(Some(&creds.api_key), &self.config.user_agent),
            (Auth::Signed, Some(creds)) => build_auth_headers(
                self.oracle.as_ref(),
                creds,
                endpoint,
                method.as_str(),
                body,
                &self.config.user_agent,
            ),
            (_, None) => Err(AppError::Validation(format!(
                "Credentials required for {}",
                endpoint
            ))),
        }
    }

    /// Send one request and return the HTTP status with the parsed JSON body
    /// (`Value::Null` for an empty body). Non-2xx answers are returned, not
    /// raised; callers decide which statuses are meaningful.
    async fn send(
        &self,
        method: Method,
        path: &str,
        endpoint: &str,
        auth: Auth,
        creds: Option<&ApiCredentials>,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value)> {
        let body_text = body.map(serde_json::to_string).transpose()?;
        let headers = self.headers(auth, creds, endpoint, &method, body_text.as_deref())?;
        let url = self.config.url(path);

        tracing::debug!(method = %method, url = %url, auth = ?auth, "Extended request");

        let mut request = self.http.request(method, &url).headers(headers);
        if let Some(text) = body_text {
            request = request.body(text);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::from(ExchangeError::NetworkTimeout(
                    self.config.request_timeout.as_millis() as u64,
                ))
            } else {
                AppError::from(ExchangeError::ConnectionFailed(e.to_string()))
            }
        })?;

        let status = response.status();
        let text = response.text().await?;
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok((status, payload))
    }

    /// `send`, failing on any non-2xx answer with the body's error text
    async fn send_ok(
        &self,
        method: Method,
        path: &str,
        endpoint: &str,
        auth: Auth,
        creds: Option<&ApiCredentials>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let (status, payload) = self.send(method, path, endpoint, auth, creds, body).await?;
        if !status.is_success() {
            return Err(http_error(status, &payload));
        }
        Ok(payload)
    }
}

fn http_error(status: StatusCode, payload: &Value) -> AppError {
    let message = error_message(payload).unwrap_or_else(|| match payload {
        Value::String(s) => s.clone(),
        Value::Null => status.canonical_reason().unwrap_or("no body").to_string(),
        other => other.to_string(),
    });
    ExchangeError::HttpStatus {
        service: SERVICE.to_string(),
        status: status.as_u16(),
        message,
    }
    .into()
}

fn rejection(status: StatusCode, payload: &Value, what: &str) -> AppError {
    let message = error_message(payload).unwrap_or_else(|| format!("{} rejected", what));
    AppError::external(SERVICE, Some(status.as_u16()), message)
}

#[async_trait]
impl ExtendedApi for ExtendedClient {
    async fn market(&self, market: &str) -> Result<MarketMetadata> {
        let path = format!("info/markets?market={}", market);
        let payload = self
            .send_ok(Method::GET, &path, "markets", Auth::Public, None, None)
            .await?;
        let entry = first_entry(&payload, "markets")
            .map_err(|_| AppError::Validation(format!("Market {} not found", market)))?;
        MarketMetadata::from_json(entry)
    }

    async fn fees(&self, creds: &ApiCredentials, market: &str) -> Result<FeeSchedule> {
        let path = format!("user/fees?market={}", market);
        let payload = self
            .send_ok(Method::GET, &path, "fees", Auth::ApiKey, Some(creds), None)
            .await?;
        FeeSchedule::from_json(first_entry(&payload, "fees")?)
    }

    async fn starknet_domain(&self) -> Result<StarknetDomain> {
        let payload = self
            .send_ok(Method::GET, "info/starknet", "starknet", Auth::Public, None, None)
            .await?;
        parse_data(&payload, "starknet")
    }

    async fn balance(&self, creds: &ApiCredentials) -> Result<Balance> {
        let (status, payload) = self
            .send(Method::GET, "user/balance", "balance", Auth::ApiKey, Some(creds), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Balance::zero());
        }
        if status.is_success() && is_ok(&payload) {
            return parse_data(&payload, "balance");
        }

        tracing::debug!(
            status = status.as_u16(),
            api_key = %sanitize(&creds.api_key),
            "Balance with API key only failed, retrying with signed headers"
        );

        let (status, payload) = self
            .send(Method::GET, "user/balance", "balance", Auth::Signed, Some(creds), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Balance::zero());
        }
        if !status.is_success() {
            return Err(http_error(status, &payload));
        }
        if payload.get("status").is_some() && !is_ok(&payload) {
            return Err(rejection(status, &payload, "balance"));
        }
        parse_data(&payload, "balance")
    }

    async fn account_info(&self, creds: &ApiCredentials) -> Result<AccountInfo> {
        let payload = self
            .send_ok(Method::GET, "user/account/info", "account/info", Auth::Signed, Some(creds), None)
            .await?;
        parse_data(&payload, "account/info")
    }

    async fn positions(&self, creds: &ApiCredentials) -> Result<Vec<Position>> {
        let payload = self
            .send_ok(Method::GET, "user/positions", "positions", Auth::Signed, Some(creds), None)
            .await?;
        data_list(&payload, "positions")
    }

    async fn open_orders(&self, creds: &ApiCredentials) -> Result<Vec<OpenOrder>> {
        let payload = self
            .send_ok(Method::GET, "user/orders", "orders", Auth::Signed, Some(creds), None)
            .await?;
        data_list(&payload, "orders")
    }

    async fn set_leverage(&self, creds: &ApiCredentials, market: &str, leverage: u32) -> Result<bool> {
        let body = json!({ "market": market, "leverage": leverage.to_string() });
        let payload = self
            .send_ok(Method::PATCH, "user/leverage", "leverage", Auth::Signed, Some(creds), Some(&body))
            .await?;
        Ok(is_ok(&payload))
    }

    async fn submit_order(&self, creds: &ApiCredentials, order: &SignedOrder) -> Result<OrderAck> {
        let body = serde_json::to_value(order)?;
        let (status, payload) = self
            .send(Method::POST, "user/order", "order", Auth::Signed, Some(creds), Some(&body))
            .await?;

        if !status.is_success() || !is_ok(&payload) {
            return Err(rejection(status, &payload, "order"));
        }

        let data = data_or_self(&payload);
        let id = id_field(data.get("id"))
            .or_else(|| id_field(data.get("orderId")))
            .or_else(|| id_field(payload.get("order_id")))
            .unwrap_or_else(|| order.id.clone());
        let ack_status = payload
            .get("status")
            .filter(|s| s.as_str() != Some("OK"))
            .or_else(|| data.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("SUBMITTED")
            .to_string();

        Ok(OrderAck {
            id,
            status: ack_status,
        })
    }

    async fn cancel_order(&self, creds: &ApiCredentials, order_id: &str) -> Result<()> {
        let body = json!({ "order_id": order_id });
        let (status, payload) = self
            .send(Method::DELETE, "user/order", "order", Auth::Signed, Some(creds), Some(&body))
            .await?;
        if !status.is_success() || (payload.get("status").is_some() && !is_ok(&payload)) {
            return Err(rejection(status, &payload, "cancel"));
        }
        Ok(())
    }

    async fn tickers(&self, asset: Option<&str>) -> Result<Vec<Ticker>> {
        let path = match asset {
            Some(asset) => format!("market/ticker/{}", asset),
            None => "market/ticker".to_string(),
        };
        let payload = self
            .send_ok(Method::GET, &path, "ticker", Auth::Public, None, None)
            .await?;
        ticker_values(&payload)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| AppError::data("tickers", e.to_string())))
            .collect()
    }

    async fn available_markets(&self) -> Result<Vec<String>> {
        let payload = self
            .send_ok(Method::GET, "info/markets", "markets", Auth::Public, None, None)
            .await?;
        match data_or_self(&payload) {
            Value::Array(items) => Ok(items
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()),
            _ => Err(AppError::data("markets", "Expected a list of markets")),
        }
    }

    async fn transfer(&self, creds: &ApiCredentials, request: &TransferRequest) -> Result<()> {
        let body = serde_json::to_value(request)?;
        let (status, payload) = self
            .send(Method::POST, "user/transfer", "transfer", Auth::ApiKey, Some(creds), Some(&body))
            .await?;
        if !status.is_success() || (payload.get("status").is_some() && !is_ok(&payload)) {
            return Err(rejection(status, &payload, "transfer"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::extended::signing::tests::TEST_PRIVATE_KEY;
    use crate::adapters::extended::signing::StarkSigningOracle;
    use rust_decimal_macros::dec;

    fn creds() -> ApiCredentials {
        ApiCredentials {
            api_key: "test-api-key-0001".into(),
            public_key: "0x1".into(),
            private_key: TEST_PRIVATE_KEY.into(),
        }
    }

    fn client(server: &mockito::Server) -> ExtendedClient {
        ExtendedClient::new(ExtendedConfig::new(&server.url()), StarkSigningOracle::shared())
    }

    #[tokio::test]
    async fn test_balance_api_key_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/user/balance")
            .match_header("x-api-key", "test-api-key-0001")
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"collateralName":"USDC","balance":"120.5","equity":"120.5","availableForTrade":"100.25","availableForWithdrawal":"100.25","unrealisedPnl":"0"}}"#)
            .create_async()
            .await;

        let balance = client(&server).balance(&creds()).await.unwrap();
        assert_eq!(balance.available_for_trade, dec!(100.25));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_balance_404_is_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/user/balance")
            .with_status(404)
            .create_async()
            .await;

        let balance = client(&server).balance(&creds()).await.unwrap();
        assert_eq!(balance, Balance::zero());
        assert_eq!(balance.collateral_name, "USDC");
    }

    #[tokio::test]
    async fn test_balance_falls_back_to_signed_request() {
        let mut server = mockito::Server::new_async().await;
        let plain = server
            .mock("GET", "/api/v1/user/balance")
            .match_header("x-starknet-signature", mockito::Matcher::Missing)
            .with_status(401)
            .with_body(r#"{"status":"ERROR","error":{"code":401,"message":"unauthorized"}}"#)
            .create_async()
            .await;
        let signed = server
            .mock("GET", "/api/v1/user/balance")
            .match_header("x-starknet-signature", mockito::Matcher::Regex(r"^\d+,\d+$".into()))
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"availableForTrade":"55"}}"#)
            .create_async()
            .await;

        let balance = client(&server).balance(&creds()).await.unwrap();
        assert_eq!(balance.available_for_trade, dec!(55));
        plain.assert_async().await;
        signed.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_order_rejection_carries_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/user/order")
            .with_status(400)
            .with_body(r#"{"status":"ERROR","error":{"code":1140,"message":"New order cost exceeds available balance"}}"#)
            .create_async()
            .await;

        let order = crate::adapters::extended::order::tests::sample_signed_order();
        let err = client(&server).submit_order(&creds(), &order).await.unwrap_err();
        assert!(err.is_balance_error());
        assert!(matches!(err, AppError::ExternalService { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_submit_order_ack_normalization() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/user/order")
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"orderId":98765}}"#)
            .create_async()
            .await;

        let order = crate::adapters::extended::order::tests::sample_signed_order();
        let ack = client(&server).submit_order(&creds(), &order).await.unwrap();
        assert_eq!(ack.id, "98765");
        assert_eq!(ack.status, "SUBMITTED");
    }

    #[tokio::test]
    async fn test_submit_order_ack_falls_back_to_local_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/user/order")
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"status":"NEW"}}"#)
            .create_async()
            .await;

        let order = crate::adapters::extended::order::tests::sample_signed_order();
        let ack = client(&server).submit_order(&creds(), &order).await.unwrap();
        assert_eq!(ack.id, order.id);
        assert_eq!(ack.status, "NEW");
    }

    #[tokio::test]
    async fn test_set_leverage_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/api/v1/user/leverage")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"market":"BTC-USD","leverage":"10"}"#.into(),
            ))
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"market":"BTC-USD","leverage":"10"}}"#)
            .create_async()
            .await;

        assert!(client(&server).set_leverage(&creds(), "BTC-USD", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_positions_and_account_info() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/user/positions")
            .with_status(200)
            .with_body(r#"{"status":"OK","data":[{"market":"BTC-USD","side":"LONG","size":"0.002","leverage":"10"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/user/account/info")
            .with_status(200)
            .with_body(r#"{"status":"OK","data":{"status":"ACTIVE","l2Key":"0xabc","l2Vault":"10002","accountId":3001}}"#)
            .create_async()
            .await;

        let c = client(&server);
        let positions = c.positions(&creds()).await.unwrap();
        assert_eq!(positions[0].size, dec!(0.002));
        let info = c.account_info(&creds()).await.unwrap();
        assert_eq!(info.l2_vault.as_deref(), Some("10002"));
        assert_eq!(info.account_id.as_deref(), Some("3001"));
    }

    #[tokio::test]
    async fn test_market_not_found_is_validation_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/info/markets")
            .match_query(mockito::Matcher::UrlEncoded("market".into(), "NOPE-USD".into()))
            .with_status(200)
            .with_body(r#"{"status":"OK","data":[]}"#)
            .create_async()
            .await;

        let err = client(&server).market("NOPE-USD").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_tickers_and_domain() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/market/ticker/BTC")
            .with_status(200)
            .with_body(r#"{"tickers":[{"asset":"BTC","bidPrice":"64000","askPrice":"64001"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/info/starknet")
            .with_status(200)
            .with_body(r#"{"name":"Perpetuals","version":"v0","chainId":"SN_MAIN","revision":"1"}"#)
            .create_async()
            .await;

        let c = client(&server);
        let tickers = c.tickers(Some("BTC")).await.unwrap();
        assert_eq!(tickers[0].symbol, "BTC");
        assert_eq!(tickers[0].ask_price, Some(dec!(64001)));
        let domain = c.starknet_domain().await.unwrap();
        assert_eq!(domain.chain_id, "SN_MAIN");
    }

    #[tokio::test]
    async fn test_server_error_is_external_service() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/user/orders")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let err = client(&server).open_orders(&creds()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService { status: Some(503), .. }));
        assert!(err.to_string().contains("upstream unavailable"));
    }
}
