//! Hyperliquid WebSocket reads
//!
//! One-shot snapshots (`top_of_book`, `user_snapshot`) open a connection,
//! subscribe, take the first usable message and close. Both are bounded by
//! the snapshot timeout and fall back to an empty result.
//!
//! [`PriceFeed`] keeps one `l2Book` subscription alive for the lifetime of
//! a humanizer run and reconnects with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::config::HyperliquidConfig;
use super::types::{l2_book_subscription, web_data_subscription, BookTop, HyperliquidWsMessage, UserSnapshot};
use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::{connect_tls, reconnect_with_backoff, ReconnectConfig, TlsWebSocketStream};

fn decode(message: &Message) -> Option<HyperliquidWsMessage> {
    let text = match message {
        Message::Text(text) => text.as_str(),
        Message::Binary(data) => std::str::from_utf8(data).ok()?,
        _ => return None,
    };
    match serde_json::from_str::<HyperliquidWsMessage>(text) {
        Ok(msg) => Some(msg),
        Err(_) => {
            tracing::trace!(message = %text, "Hyperliquid: unknown message format");
            None
        }
    }
}

async fn open_subscription(url: &str, subscription: &Value) -> ExchangeResult<TlsWebSocketStream> {
    let mut stream = connect_tls(url).await?;
    stream
        .send(Message::Text(subscription.to_string()))
        .await
        .map_err(|e| ExchangeError::WebSocket(Box::new(e)))?;
    Ok(stream)
}

/// First message `extract` accepts, or `None` on timeout, close or error
async fn first_match<T, F>(url: &str, subscription: Value, timeout: Duration, mut extract: F) -> Option<T>
where
    F: FnMut(HyperliquidWsMessage) -> Option<T>,
{
    let read = async {
        let mut stream = match open_subscription(url, &subscription).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Hyperliquid snapshot connection failed");
                return None;
            }
        };
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(message) => {
                    if let Some(value) = decode(&message).and_then(&mut extract) {
                        let _ = stream.close(None).await;
                        return Some(value);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Hyperliquid snapshot stream error");
                    break;
                }
            }
        }
        None
    };

    match tokio::time::timeout(timeout, read).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Hyperliquid snapshot timed out");
            None
        }
    }
}

/// Best bid/ask of `coin` from a one-shot `l2Book` subscription
pub async fn top_of_book(config: &HyperliquidConfig, coin: &str) -> Option<BookTop> {
    first_match(config.ws_url(), l2_book_subscription(coin), config.snapshot_timeout, |msg| match msg {
        HyperliquidWsMessage::L2Book(book) if book.coin == coin => book.top(),
        _ => None,
    })
    .await
}

/// Spot balances of `user`, `None` when no snapshot arrived in time
pub async fn fetch_user_snapshot(config: &HyperliquidConfig, user: &str) -> Option<UserSnapshot> {
    first_match(config.ws_url(), web_data_subscription(user), config.snapshot_timeout, |msg| match msg {
        HyperliquidWsMessage::WebData2(data) => Some(UserSnapshot::from(&data)),
        _ => None,
    })
    .await
}

/// Spot balances of `user`; empty on timeout
pub async fn user_snapshot(config: &HyperliquidConfig, user: &str) -> UserSnapshot {
    fetch_user_snapshot(config, user).await.unwrap_or_default()
}

// =============================================================================
// PriceFeed
// =============================================================================

/// Latest top of book for one coin, kept fresh by a background task
pub struct PriceFeed {
    coin: String,
    latest: Arc<RwLock<Option<BookTop>>>,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PriceFeed {
    /// Start streaming; the task ends when `cancel` fires or reconnects are exhausted
    pub fn spawn(config: HyperliquidConfig, coin: &str, cancel: &CancellationToken) -> Arc<Self> {
        let cancel = cancel.child_token();
        let latest = Arc::new(RwLock::new(None));
        let feed = Arc::new(Self {
            coin: coin.to_string(),
            latest: Arc::clone(&latest),
            cancel: cancel.clone(),
            handle: std::sync::Mutex::new(None),
        });

        let handle = tokio::spawn(run_feed(config, coin.to_string(), latest, cancel));
        if let Ok(mut slot) = feed.handle.lock() {
            *slot = Some(handle);
        }
        feed
    }

    /// Feed without a background task, updated through [`PriceFeed::store`]
    pub fn detached(coin: &str) -> Self {
        Self {
            coin: coin.to_string(),
            latest: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
            handle: std::sync::Mutex::new(None),
        }
    }

    pub fn coin(&self) -> &str {
        &self.coin
    }

    pub async fn latest(&self) -> Option<BookTop> {
        *self.latest.read().await
    }

    pub async fn store(&self, top: BookTop) {
        *self.latest.write().await = Some(top);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for PriceFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_books(stream: &mut TlsWebSocketStream, coin: &str, latest: &RwLock<Option<BookTop>>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => {
                tracing::info!("Hyperliquid WebSocket closed by server");
                return;
            }
            Ok(message) => match decode(&message) {
                Some(HyperliquidWsMessage::L2Book(book)) if book.coin == coin => {
                    if let Some(top) = book.top() {
                        *latest.write().await = Some(top);
                        tracing::trace!(coin = %coin, bid = %top.bid, ask = %top.ask, "Hyperliquid book updated");
                    }
                }
                Some(HyperliquidWsMessage::SubscriptionResponse(_)) => {
                    tracing::debug!("Hyperliquid subscription confirmed");
                }
                _ => {}
            },
            Err(e) => {
                tracing::error!("Hyperliquid WebSocket error: {}", e);
                return;
            }
        }
    }
}

async fn run_feed(
    config: HyperliquidConfig,
    coin: String,
    latest: Arc<RwLock<Option<BookTop>>>,
    cancel: CancellationToken,
) {
    let subscription = l2_book_subscription(&coin);
    let url = config.ws_url().to_string();
    let reconnect = ReconnectConfig::default();

    let mut stream = open_subscription(&url, &subscription).await.ok();
    loop {
        if let Some(active) = stream.as_mut() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = read_books(active, &coin, &latest) => {}
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        tracing::warn!(coin = %coin, "Hyperliquid price feed disconnected, reconnecting");
        let attempt = reconnect_with_backoff(&reconnect, "Hyperliquid", || open_subscription(&url, &subscription));
        stream = tokio::select! {
            _ = cancel.cancelled() => break,
            result = attempt => match result {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::error!(coin = %coin, error = %e, "Hyperliquid price feed gave up");
                    break;
                }
            },
        };
    }

    tracing::info!(coin = %coin, "Hyperliquid price feed stopped");
}
