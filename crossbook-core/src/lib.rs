//! Core types for the cross-venue order book
//!
//! This crate defines the shared data model (price levels, venue books,
//! connection state), the [`VenueFeed`] protocol seam, and the pure
//! aggregation, best-price and quote functions that run over book snapshots.

pub mod connection;
pub mod error;
pub mod feed;
pub mod market;
pub mod orderbook;
pub mod platform;
pub mod quote;
pub mod websocket;

pub use connection::{
    ConnectionEvent, ConnectionStatus, ReconnectDecision, StreamConfig, VenueConnectionState,
};
pub use error::{CrossbookError, CrossbookResult};
pub use feed::VenueFeed;
pub use market::{BookUpdate, MarketPair, Outcome, PriceLevel, UpdateKind, VenueOrderBook};
pub use orderbook::{
    aggregate, best_prices, format_price, format_size, venue_size, AggregatedOrderBook,
    AggregatedPriceLevel, BestPrices,
};
pub use platform::{Venue, VenueSplit};
pub use quote::{calculate_quote, invert_bid, FillDetail, QuoteResult, VenueFill};
pub use websocket::VenueEvent;
