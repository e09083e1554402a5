//! Cross-venue order book aggregation
//!
//! Pure functions over book snapshots: merging two venues into one ladder,
//! deriving best prices, and formatting prices and sizes for display.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::market::{PriceLevel, VenueOrderBook};
use crate::platform::{Venue, VenueSplit};

/// One price of the merged ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPriceLevel {
    /// YES price in cents
    pub price: Decimal,
    /// Always equal to the sum of `breakdown`
    pub total_size: Decimal,
    pub breakdown: VenueSplit<Decimal>,
}

/// Merged view of both venues
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedOrderBook {
    /// Sorted by price descending
    pub bids: Vec<AggregatedPriceLevel>,
    /// Sorted by price ascending
    pub asks: Vec<AggregatedPriceLevel>,
}

/// Top of the merged book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPrices {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    /// `best_ask - best_bid`; negative when the merged book is crossed
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
}

/// Merge both venues' ladders by exact price.
///
/// Sizes at identical prices are summed with each venue's share kept in the
/// breakdown; no coalescing happens across different prices.
pub fn aggregate(polymarket: &VenueOrderBook, kalshi: &VenueOrderBook) -> AggregatedOrderBook {
    let bids = merge_by_price(&polymarket.bids, &kalshi.bids);
    let asks = merge_by_price(&polymarket.asks, &kalshi.asks);

    AggregatedOrderBook {
        bids: bids.into_values().rev().collect(),
        asks: asks.into_values().collect(),
    }
}

fn merge_by_price(
    polymarket: &[PriceLevel],
    kalshi: &[PriceLevel],
) -> BTreeMap<Decimal, AggregatedPriceLevel> {
    let mut combined: BTreeMap<Decimal, AggregatedPriceLevel> = BTreeMap::new();

    for level in polymarket.iter().chain(kalshi) {
        let entry = combined
            .entry(level.price)
            .or_insert_with(|| AggregatedPriceLevel {
                price: level.price,
                total_size: Decimal::ZERO,
                breakdown: VenueSplit::default(),
            });
        entry.total_size += level.size;
        *entry.breakdown.get_mut(level.venue) += level.size;
    }

    combined
}

/// Best bid/ask, spread and mid of a merged book.
///
/// A crossed book is reported as is, with a negative spread.
pub fn best_prices(book: &AggregatedOrderBook) -> BestPrices {
    let best_bid = book.bids.first().map(|l| l.price);
    let best_ask = book.asks.first().map(|l| l.price);

    let (spread, mid_price) = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => (Some(ask - bid), Some((bid + ask) / Decimal::TWO)),
        _ => (None, None),
    };

    BestPrices {
        best_bid,
        best_ask,
        spread,
        mid_price,
    }
}

/// Size available on one venue at one price of the merged ladder
pub fn venue_size(level: &AggregatedPriceLevel, venue: Venue) -> Decimal {
    *level.breakdown.get(venue)
}

/// Format a cents price: `50¢`, `50.5¢`
pub fn format_price(price_cents: Decimal) -> String {
    if price_cents.fract().is_zero() {
        format!("{}¢", price_cents.trunc())
    } else {
        format!(
            "{}¢",
            price_cents.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
        )
    }
}

/// Format a notional size: `$250`, `$1.5k`
pub fn format_size(size: Decimal) -> String {
    let thousand = Decimal::ONE_THOUSAND;
    if size >= thousand {
        let k = (size / thousand).round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        format!("${:.1}k", k)
    } else {
        format!(
            "${}",
            size.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        )
    }
}
