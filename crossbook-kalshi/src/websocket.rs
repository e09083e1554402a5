//! Kalshi orderbook channel (via DFlow)
//!
//! Stream frames are level changes: each `price -> quantity` entry sets the
//! absolute size at that price and a quantity of 0 removes the level. The
//! full book comes from [`KalshiClient::get_orderbook`] after every connect.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crossbook_core::{BookUpdate, CrossbookResult, UpdateKind, Venue, VenueFeed};

use crate::client::KalshiClient;
use crate::types::{OrderbookMessage, PingMessage, SubscribeMessage};

/// DFlow WebSocket URL
pub const DFLOW_WS_URL: &str = "wss://dev-prediction-markets-api.dflow.net/api/v1/ws";

/// Parse one inbound frame from the orderbook channel.
/// Updates tagged with a ticker outside `tickers` are skipped.
pub fn parse_frame(text: &str, tickers: &[String]) -> CrossbookResult<Vec<BookUpdate>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("pong") {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(trimmed)?;

    if json.get("type").and_then(Value::as_str) == Some("pong") {
        return Ok(Vec::new());
    }

    if json.get("channel").and_then(Value::as_str) != Some("orderbook") {
        debug!("[Kalshi WS] Ignoring frame: {}", trimmed);
        return Ok(Vec::new());
    }

    let msg: OrderbookMessage = serde_json::from_value(json)?;
    if let Some(ticker) = msg.market_ticker.as_deref() {
        if !tickers.iter().any(|t| t == ticker) {
            debug!("[Kalshi WS] Skipping update for {}", ticker);
            return Ok(Vec::new());
        }
    }
    debug!("[Kalshi WS] Orderbook update for {:?}", msg.market_ticker);

    let update = msg.to_book_update(UpdateKind::Delta)?;
    Ok(vec![update])
}

/// Configuration for KalshiFeed
#[derive(Debug, Clone)]
pub struct KalshiFeedConfig {
    pub ws_url: String,
}

impl Default for KalshiFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: std::env::var("DFLOW_WS_URL").unwrap_or_else(|_| DFLOW_WS_URL.to_string()),
        }
    }
}

/// Kalshi side of a venue stream
#[derive(Clone)]
pub struct KalshiFeed {
    config: KalshiFeedConfig,
    client: KalshiClient,
}

impl KalshiFeed {
    pub fn new(config: KalshiFeedConfig, client: KalshiClient) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl VenueFeed for KalshiFeed {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    fn ws_url(&self) -> &str {
        &self.config.ws_url
    }

    fn subscribe_message(&self, instruments: &[String]) -> CrossbookResult<String> {
        let msg = SubscribeMessage {
            msg_type: "subscribe".to_string(),
            channel: "orderbook".to_string(),
            tickers: instruments.to_vec(),
        };
        Ok(serde_json::to_string(&msg)?)
    }

    fn ping_message(&self) -> String {
        serde_json::to_string(&PingMessage {
            msg_type: "ping".to_string(),
        })
        .unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string())
    }

    fn parse_message(
        &self,
        text: &str,
        instruments: &[String],
    ) -> CrossbookResult<Vec<BookUpdate>> {
        parse_frame(text, instruments)
    }

    fn needs_initial_snapshot(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self, instrument: &str) -> CrossbookResult<BookUpdate> {
        self.client.get_orderbook(instrument).await
    }
}
