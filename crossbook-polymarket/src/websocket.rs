//! Polymarket market-channel protocol
//!
//! Subscribes to the CLOB market channel and normalizes `book` and
//! `price_change` frames into YES-cents price levels.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crossbook_core::{
    BookUpdate, CrossbookError, CrossbookResult, PriceLevel, Venue, VenueFeed,
};

/// Polymarket WebSocket URL (market channel - no auth required)
pub const POLYMARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

// ============================================================================
// WebSocket Message Types (matching Polymarket's protocol)
// ============================================================================

/// Subscribe message for market channel
#[derive(Debug, Clone, Serialize)]
pub struct MarketSubscribeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub assets_ids: Vec<String>,
}

/// Keepalive frame
#[derive(Debug, Clone, Serialize)]
pub struct PingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

/// Full book for one asset
#[derive(Debug, Clone, Deserialize)]
pub struct BookMessage {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Incremental level changes
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeMessage {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(alias = "price_changes")]
    pub changes: Vec<PriceChangeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeItem {
    /// Set on market-level frames, which mix both outcome tokens
    #[serde(default)]
    pub asset_id: Option<String>,
    pub price: String,
    pub size: String,
    pub side: String, // "BUY" or "SELL"
}

// ============================================================================
// Normalization
// ============================================================================

/// Probability string (0.0 - 1.0) to cents, rounded to 0.1¢
pub fn parse_price_cents(raw: &str) -> CrossbookResult<Decimal> {
    let probability: Decimal = raw
        .trim()
        .parse()
        .map_err(|e| CrossbookError::parse(format!("invalid price '{}': {}", raw, e)))?;

    if probability < Decimal::ZERO || probability > Decimal::ONE {
        return Err(CrossbookError::parse(format!(
            "price '{}' outside [0, 1]",
            raw
        )));
    }

    Ok((probability * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Share count string, used as-is
pub fn parse_size(raw: &str) -> CrossbookResult<Decimal> {
    let size: Decimal = raw
        .trim()
        .parse()
        .map_err(|e| CrossbookError::parse(format!("invalid size '{}': {}", raw, e)))?;

    if size < Decimal::ZERO {
        return Err(CrossbookError::parse(format!("negative size '{}'", raw)));
    }
    Ok(size)
}

fn convert_level(level: &BookLevel) -> CrossbookResult<PriceLevel> {
    Ok(PriceLevel::new(
        parse_price_cents(&level.price)?,
        parse_size(&level.size)?,
        Venue::Polymarket,
    ))
}

/// Convert a book message into a snapshot update
pub fn convert_book_message(msg: &BookMessage) -> CrossbookResult<BookUpdate> {
    let bids = msg.bids.iter().map(convert_level).collect::<CrossbookResult<Vec<_>>>()?;
    let asks = msg.asks.iter().map(convert_level).collect::<CrossbookResult<Vec<_>>>()?;
    Ok(BookUpdate::snapshot(bids, asks))
}

/// Whether content tagged with `asset_id` belongs to the subscribed tokens.
/// Untagged content is accepted.
fn is_subscribed(asset_id: Option<&str>, instruments: &[String]) -> bool {
    asset_id.is_none_or(|id| instruments.iter().any(|token| token == id))
}

/// Convert a price change message into a delta update.
///
/// Each change is routed by its own `asset_id`, falling back to the frame's;
/// changes for other tokens are skipped. Returns `None` when nothing is left.
pub fn convert_price_change(
    msg: &PriceChangeMessage,
    instruments: &[String],
) -> CrossbookResult<Option<BookUpdate>> {
    let mut bids = Vec::new();
    let mut asks = Vec::new();

    for change in &msg.changes {
        let asset_id = change.asset_id.as_deref().or(msg.asset_id.as_deref());
        if !is_subscribed(asset_id, instruments) {
            continue;
        }

        let level = PriceLevel::new(
            parse_price_cents(&change.price)?,
            parse_size(&change.size)?,
            Venue::Polymarket,
        );
        match change.side.to_uppercase().as_str() {
            "BUY" => bids.push(level),
            "SELL" => asks.push(level),
            other => {
                return Err(CrossbookError::parse(format!(
                    "unknown price change side '{}'",
                    other
                )))
            }
        }
    }

    if bids.is_empty() && asks.is_empty() {
        return Ok(None);
    }
    Ok(Some(BookUpdate::delta(bids, asks)))
}

fn parse_object(msg: Value, instruments: &[String]) -> CrossbookResult<Option<BookUpdate>> {
    if msg.get("bids").is_some() && msg.get("asks").is_some() {
        let book: BookMessage = serde_json::from_value(msg)?;
        if !is_subscribed(book.asset_id.as_deref(), instruments) {
            debug!("[Polymarket WS] Skipping book for {:?}", book.asset_id);
            return Ok(None);
        }
        debug!("[Polymarket WS] Book update for {:?}", book.asset_id);
        return convert_book_message(&book).map(Some);
    }

    if msg.get("changes").is_some() || msg.get("price_changes").is_some() {
        let change: PriceChangeMessage = serde_json::from_value(msg)?;
        debug!("[Polymarket WS] Price change for {:?}", change.asset_id);
        return convert_price_change(&change, instruments);
    }

    // acknowledgements, pongs, trade prints, tick size changes
    Ok(None)
}

/// Parse one inbound frame, which may be a single object or an array of them.
/// Only content for `instruments` (or carrying no asset id) is kept.
pub fn parse_frame(text: &str, instruments: &[String]) -> CrossbookResult<Vec<BookUpdate>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("PONG") {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(trimmed)?;
    let messages = match json {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut updates = Vec::new();
    for msg in messages {
        if let Some(update) = parse_object(msg, instruments)? {
            updates.push(update);
        }
    }
    Ok(updates)
}

// ============================================================================
// Polymarket Feed
// ============================================================================

/// Configuration for PolymarketFeed
#[derive(Debug, Clone)]
pub struct PolymarketFeedConfig {
    pub ws_url: String,
}

impl Default for PolymarketFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: std::env::var("POLYMARKET_WS_URL")
                .unwrap_or_else(|_| POLYMARKET_WS_URL.to_string()),
        }
    }
}

/// Polymarket side of a venue stream
#[derive(Debug, Clone, Default)]
pub struct PolymarketFeed {
    config: PolymarketFeedConfig,
}

impl PolymarketFeed {
    pub fn new(config: PolymarketFeedConfig) -> Self {
        Self { config }
    }
}

impl VenueFeed for PolymarketFeed {
    fn venue(&self) -> Venue {
        Venue::Polymarket
    }

    fn ws_url(&self) -> &str {
        &self.config.ws_url
    }

    fn subscribe_message(&self, instruments: &[String]) -> CrossbookResult<String> {
        let msg = MarketSubscribeMessage {
            msg_type: "market".to_string(),
            assets_ids: instruments.to_vec(),
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
}
