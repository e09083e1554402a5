//! Liquidity-walk quotes across both venues
//!
//! Answers "how many shares does $X buy" for one outcome by consuming the
//! cheapest resting liquidity of both venues first.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::{Outcome, PriceLevel, VenueOrderBook};
use crate::platform::{Venue, VenueSplit};

/// Levels priced below this (in cents, on either side of a NO inversion)
/// are treated as noise and never filled
pub const MIN_VIABLE_PRICE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// A single fill producing more shares than this is discarded
pub const MAX_FILL_SHARES: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// One consumed level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillDetail {
    pub venue: Venue,
    /// Outcome price in cents
    pub price: Decimal,
    /// Notional spent at this level
    pub spent: Decimal,
    pub shares: Decimal,
}

/// Per-venue totals of a quote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueFill {
    pub shares: Decimal,
    pub spent: Decimal,
}

/// Result of a simulated market buy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    /// Equal to the sum of `fills[..].shares`
    pub total_shares: Decimal,
    /// Spend-weighted average price in cents, within `[0, 100]`
    pub average_price: Decimal,
    /// Notional actually spent; below the requested amount when liquidity ran out
    pub total_spent: Decimal,
    pub fills: Vec<FillDetail>,
    pub breakdown: VenueSplit<VenueFill>,
}

/// Complementary-outcome price: `100 - price`
pub fn complement_price(price: Decimal) -> Decimal {
    Decimal::ONE_HUNDRED - price
}

/// Re-express a YES bid as a NO ask.
///
/// Size is rescaled by `no_price / yes_price` so the same notional buys the
/// right number of NO shares. Returns `None` when either price is below
/// [`MIN_VIABLE_PRICE`]. Prices above `100 - MIN_VIABLE_PRICE` are kept.
pub fn invert_bid(bid: &PriceLevel) -> Option<PriceLevel> {
    let yes_price = bid.price;
    let no_price = complement_price(yes_price);

    if no_price < MIN_VIABLE_PRICE || yes_price < MIN_VIABLE_PRICE {
        return None;
    }

    let adjusted_size = bid.size.checked_mul(no_price)?.checked_div(yes_price)?;

    Some(PriceLevel::new(no_price, adjusted_size, bid.venue))
}

/// Sell-side liquidity for `outcome`, cheapest first
fn candidates_for(
    outcome: Outcome,
    polymarket: &VenueOrderBook,
    kalshi: &VenueOrderBook,
) -> Vec<PriceLevel> {
    let mut candidates: Vec<PriceLevel> = match outcome {
        Outcome::Yes => polymarket.asks.iter().chain(&kalshi.asks).cloned().collect(),
        Outcome::No => polymarket
            .bids
            .iter()
            .chain(&kalshi.bids)
            .filter_map(invert_bid)
            .collect(),
    };

    // stable: equal prices keep Polymarket ahead of Kalshi
    candidates.sort_by(|a, b| a.price.cmp(&b.price));
    candidates
}

/// Simulate spending `amount` on `outcome` across both books.
///
/// Returns `None` ("no liquidity") when nothing could be filled, when
/// `amount <= 0`, or when the resulting average price falls outside
/// `[0, 100]`. A partially filled quote is still returned.
pub fn calculate_quote(
    amount: Decimal,
    outcome: Outcome,
    polymarket: &VenueOrderBook,
    kalshi: &VenueOrderBook,
) -> Option<QuoteResult> {
    if amount <= Decimal::ZERO {
        return None;
    }

    let hundred = Decimal::ONE_HUNDRED;
    let mut remaining = amount;
    let mut total_shares = Decimal::ZERO;
    let mut fills = Vec::new();
    let mut breakdown: VenueSplit<VenueFill> = VenueSplit::default();

    for level in candidates_for(outcome, polymarket, kalshi) {
        if remaining <= Decimal::ZERO {
            break;
        }
        if level.price < MIN_VIABLE_PRICE {
            continue;
        }

        let spend = remaining.min(level.size);
        if spend <= Decimal::ZERO {
            continue;
        }

        let shares = match spend.checked_div(level.price / hundred) {
            Some(shares) if shares <= MAX_FILL_SHARES => shares,
            _ => continue,
        };

        fills.push(FillDetail {
            venue: level.venue,
            price: level.price,
            spent: spend,
            shares,
        });

        total_shares += shares;
        remaining -= spend;

        let venue_fill = breakdown.get_mut(level.venue);
        venue_fill.shares += shares;
        venue_fill.spent += spend;
    }

    if fills.is_empty() || total_shares.is_zero() {
        return None;
    }

    let total_spent = amount - remaining;
    let average_price = total_spent.checked_div(total_shares)?.checked_mul(hundred)?;

    if average_price < Decimal::ZERO || average_price > hundred {
        return None;
    }

    Some(QuoteResult {
        total_shares,
        average_price,
        total_spent,
        fills,
        breakdown,
    })
}
