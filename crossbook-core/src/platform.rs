//! Venue definitions for the aggregated prediction markets

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported prediction market venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Polymarket - continuous-probability CLOB (prices 0.0 - 1.0)
    Polymarket,
    /// Kalshi via DFlow - cents-indexed YES/NO bid ladders
    Kalshi,
}

impl Venue {
    /// Both venues, in breakdown order
    pub const ALL: [Venue; 2] = [Venue::Polymarket, Venue::Kalshi];

    /// Get the full display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Venue::Polymarket => "Polymarket",
            Venue::Kalshi => "Kalshi",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kalshi" | "k" => Ok(Venue::Kalshi),
            "polymarket" | "poly" | "p" => Ok(Venue::Polymarket),
            _ => Err(format!("Unknown venue: {}", s)),
        }
    }
}

/// A value held once per venue.
///
/// Used for per-venue size breakdowns and quote breakdowns, and for holding
/// one snapshot of each venue's book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSplit<T> {
    pub polymarket: T,
    pub kalshi: T,
}

impl<T> VenueSplit<T> {
    pub fn new(polymarket: T, kalshi: T) -> Self {
        Self { polymarket, kalshi }
    }

    pub fn get(&self, venue: Venue) -> &T {
        match venue {
            Venue::Polymarket => &self.polymarket,
            Venue::Kalshi => &self.kalshi,
        }
    }

    pub fn get_mut(&mut self, venue: Venue) -> &mut T {
        match venue {
            Venue::Polymarket => &mut self.polymarket,
            Venue::Kalshi => &mut self.kalshi,
        }
    }

    /// Iterate `(venue, value)` pairs in `Venue::ALL` order
    pub fn iter(&self) -> impl Iterator<Item = (Venue, &T)> {
        Venue::ALL.into_iter().map(move |venue| (venue, self.get(venue)))
    }
}
