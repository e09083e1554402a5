//! Streaming services for the cross-venue order book
//!
//! This crate runs the per-venue stream connections (connect, subscribe,
//! heartbeat, parse, reconnect) and the aggregator that owns them and
//! answers merged-book queries.

pub mod aggregator;
pub mod config;
pub mod connection;

pub use aggregator::{AggregatorHealth, ConnectionHealth, MarketDataAggregator};
pub use config::{EndpointSettings, StreamSettings};
pub use connection::VenueStreamConnection;
