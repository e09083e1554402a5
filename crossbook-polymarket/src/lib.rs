//! Polymarket integration for the cross-venue order book
//!
//! Implements [`crossbook_core::VenueFeed`] for the public CLOB market
//! channel. Prices arrive as probabilities (0.0 - 1.0) and are converted to
//! cents at ingestion; sizes are share counts used as-is. The stream delivers
//! a full `book` on subscribe, so no REST snapshot is needed.

pub mod websocket;

pub use websocket::{PolymarketFeed, PolymarketFeedConfig, POLYMARKET_WS_URL};
