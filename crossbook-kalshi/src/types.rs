//! DFlow wire types for Kalshi order books
//!
//! The REST snapshot and the `orderbook` stream channel share one shape:
//! a map of probability string to contract quantity for each side.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crossbook_core::{
    BookUpdate, CrossbookError, CrossbookResult, PriceLevel, UpdateKind, Venue,
};

/// Order book payload from `GET /orderbook/{ticker}` or the `orderbook` channel
#[derive(Debug, Clone, Deserialize)]
pub struct OrderbookMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default, rename = "type")]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub market_ticker: Option<String>,
    #[serde(default)]
    pub yes_bids: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub no_bids: BTreeMap<String, Decimal>,
}

/// Subscribe message for the orderbook channel
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub channel: String,
    pub tickers: Vec<String>,
}

/// Keepalive frame
#[derive(Debug, Clone, Serialize)]
pub struct PingMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

/// Probability string to whole cents
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
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
}

fn convert_side(
    levels: &BTreeMap<String, Decimal>,
    to_yes_cents: impl Fn(Decimal) -> Decimal,
) -> CrossbookResult<Vec<PriceLevel>> {
    levels
        .iter()
        .map(|(price, quantity)| {
            if *quantity < Decimal::ZERO {
                return Err(CrossbookError::parse(format!(
                    "negative quantity {} at {}",
                    quantity, price
                )));
            }
            let cents = to_yes_cents(parse_price_cents(price)?);
            Ok(PriceLevel::new(cents, *quantity, Venue::Kalshi))
        })
        .collect()
}

impl OrderbookMessage {
    /// Normalize into YES-denominated levels.
    ///
    /// YES bids become bids at their own price. A NO bid at `p` is an offer
    /// to sell YES at `100 - p`, so NO bids become asks.
    pub fn to_book_update(&self, kind: UpdateKind) -> CrossbookResult<BookUpdate> {
        let bids = convert_side(&self.yes_bids, |cents| cents)?;
        let asks = convert_side(&self.no_bids, |cents| Decimal::ONE_HUNDRED - cents)?;

        Ok(BookUpdate { kind, bids, asks })
    }
}
