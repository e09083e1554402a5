//! Order book data structures shared by every venue
//!
//! All prices are YES-outcome prices in cents (0 - 100). Venue-native formats
//! are converted into this range by the venue crates before a [`PriceLevel`]
//! is ever built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::platform::Venue;

// ============================================================================
// Outcome / Side
// ============================================================================

/// Outcome of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "y" => Ok(Outcome::Yes),
            "no" | "n" => Ok(Outcome::No),
            _ => Err(format!("Unknown outcome: {}", s)),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => write!(f, "Yes"),
            Outcome::No => write!(f, "No"),
        }
    }
}

/// Side of the book a level rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Bid,
    Ask,
}

// ============================================================================
// Price levels
// ============================================================================

/// A single resting price level, tagged with the venue it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// YES price in cents (0 - 100, fractional allowed)
    pub price: Decimal,
    /// Notional size at this level
    pub size: Decimal,
    pub venue: Venue,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal, venue: Venue) -> Self {
        Self { price, size, venue }
    }
}

/// Whether a [`BookUpdate`] replaces the book or patches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Full order book snapshot
    Snapshot,
    /// Level-by-level update; a zero size removes the level
    Delta,
}

/// Normalized book change produced by a venue parser
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub kind: UpdateKind,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookUpdate {
    pub fn snapshot(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            kind: UpdateKind::Snapshot,
            bids,
            asks,
        }
    }

    pub fn delta(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            kind: UpdateKind::Delta,
            bids,
            asks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// ============================================================================
// Venue order book
// ============================================================================

/// One venue's current ladders.
///
/// `bids` are strictly price-descending and `asks` strictly price-ascending,
/// with at most one level per price and no zero-size levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueOrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl VenueOrderBook {
    /// Create an empty order book
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Apply a normalized update and stamp `last_updated`.
    ///
    /// Levels are keyed by normalized price. A snapshot sums levels that land
    /// on the same price; a delta sets the absolute size of that price, even
    /// when a snapshot built it from several venue-native levels.
    pub fn apply(&mut self, update: BookUpdate, now: DateTime<Utc>) {
        match update.kind {
            UpdateKind::Snapshot => {
                self.bids = collapse_levels(update.bids, Side::Bid);
                self.asks = collapse_levels(update.asks, Side::Ask);
            }
            UpdateKind::Delta => {
                for level in update.bids {
                    set_level(&mut self.bids, level, Side::Bid);
                }
                for level in update.asks {
                    set_level(&mut self.asks, level, Side::Ask);
                }
            }
        }
        self.last_updated = Some(now);
    }

    /// Drop every level and forget the last update time
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_updated = None;
    }
}

/// Order two prices the way `side` sorts them (best first)
fn side_order(side: Side, a: &Decimal, b: &Decimal) -> std::cmp::Ordering {
    match side {
        Side::Bid => b.cmp(a),
        Side::Ask => a.cmp(b),
    }
}

/// Build a sorted, de-duplicated ladder from a full snapshot.
/// Levels that normalize to the same price are summed.
fn collapse_levels(levels: Vec<PriceLevel>, side: Side) -> Vec<PriceLevel> {
    let mut by_price: BTreeMap<Decimal, PriceLevel> = BTreeMap::new();
    for level in levels {
        if level.size <= Decimal::ZERO {
            continue;
        }
        by_price
            .entry(level.price)
            .and_modify(|existing| existing.size += level.size)
            .or_insert(level);
    }

    let mut ladder: Vec<PriceLevel> = by_price.into_values().collect();
    if side == Side::Bid {
        ladder.reverse();
    }
    ladder
}

/// Set one level's absolute size, keeping the ladder sorted
fn set_level(ladder: &mut Vec<PriceLevel>, level: PriceLevel, side: Side) {
    let position = ladder.binary_search_by(|existing| side_order(side, &existing.price, &level.price));

    match position {
        Ok(index) if level.size <= Decimal::ZERO => {
            ladder.remove(index);
        }
        Ok(index) => ladder[index].size = level.size,
        Err(_) if level.size <= Decimal::ZERO => {}
        Err(index) => ladder.insert(index, level),
    }
}

// ============================================================================
// Market selection
// ============================================================================

/// The same binary question listed on both venues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPair {
    pub id: String,
    pub title: String,
    /// Polymarket CLOB token id of the YES outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polymarket_token_id: Option<String>,
    /// Kalshi market ticker (as exposed by DFlow)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kalshi_ticker: Option<String>,
}

impl MarketPair {
    /// Built-in market used when nothing is configured
    pub fn demo() -> Self {
        Self {
            id: "trump-deportation-2025".to_string(),
            title: "Will Trump deport less than 250,000 in 2025?".to_string(),
            polymarket_token_id: Some(
                "101676997363687199724245607342877036148401850938023978421879460310389391082353"
                    .to_string(),
            ),
            kalshi_ticker: Some("KXFEDCHAIRNOM-29-JS".to_string()),
        }
    }

    /// Read the market from `CROSSBOOK_*` environment variables.
    ///
    /// Unset variables fall back to the demo market; a variable set to an
    /// empty string disables that venue.
    pub fn from_env() -> Self {
        let demo = Self::demo();
        let pick = |key: &str, fallback: Option<String>| match std::env::var(key) {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => fallback,
        };

        Self {
            id: std::env::var("CROSSBOOK_MARKET_ID").unwrap_or(demo.id),
            title: std::env::var("CROSSBOOK_MARKET_TITLE").unwrap_or(demo.title),
            polymarket_token_id: pick("CROSSBOOK_POLYMARKET_TOKEN", demo.polymarket_token_id),
            kalshi_ticker: pick("CROSSBOOK_KALSHI_TICKER", demo.kalshi_ticker),
        }
    }

    /// Instruments to subscribe to on `venue`
    pub fn instruments(&self, venue: Venue) -> Vec<String> {
        let id = match venue {
            Venue::Polymarket => &self.polymarket_token_id,
            Venue::Kalshi => &self.kalshi_ticker,
        };
        id.iter().cloned().collect()
    }
}
