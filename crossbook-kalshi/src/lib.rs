//! Kalshi integration for the cross-venue order book
//!
//! Kalshi books are read through the DFlow prediction-markets API: a REST
//! snapshot endpoint and a WebSocket `orderbook` channel. Both quote YES bids
//! and NO bids; NO bids are normalized into YES asks at `100 - p`.

pub mod client;
pub mod types;
pub mod websocket;

pub use client::{KalshiClient, KalshiClientConfig, DFLOW_API_BASE};
pub use websocket::{KalshiFeed, KalshiFeedConfig, DFLOW_WS_URL};
