//! Market Data Aggregator
//!
//! Owns one stream connection per venue for the selected market, and answers
//! aggregation, best-price and quote queries from fresh snapshots of both books.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crossbook_core::{
    aggregate, best_prices, calculate_quote, AggregatedOrderBook, BestPrices, ConnectionStatus,
    CrossbookResult, MarketPair, Outcome, QuoteResult, StreamConfig, Venue, VenueConnectionState,
    VenueEvent, VenueOrderBook, VenueSplit,
};
use crossbook_kalshi::{KalshiClient, KalshiFeed};
use crossbook_polymarket::PolymarketFeed;

use crate::config::StreamSettings;
use crate::connection::VenueStreamConnection;

/// Stale threshold - if no book update for this duration, consider connection stale
const STALE_THRESHOLD_SECS: i64 = 60;

/// Capacity of the update channel
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Health status for a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHealth {
    pub venue: Venue,
    pub enabled: bool,
    pub status: ConnectionStatus,
    pub connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub is_stale: bool,
}

impl ConnectionHealth {
    /// Evaluate one venue at `now`.
    ///
    /// A connected venue is stale when neither a book update nor the connect
    /// itself happened within the threshold. A disconnected venue is always stale.
    pub fn evaluate(
        venue: Venue,
        enabled: bool,
        state: &VenueConnectionState,
        last_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let connected = state.is_connected();
        let threshold = Duration::seconds(STALE_THRESHOLD_SECS);

        let is_stale = if connected {
            match last_update.or(state.last_connected) {
                Some(at) => now - at > threshold,
                None => true,
            }
        } else {
            true
        };

        Self {
            venue,
            enabled,
            status: state.status,
            connected,
            last_update,
            reconnect_attempts: state.reconnect_attempts,
            error_message: state.error_message.clone(),
            is_stale,
        }
    }
}

/// Overall aggregator health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatorHealth {
    pub polymarket: ConnectionHealth,
    pub kalshi: ConnectionHealth,
    pub healthy: bool,
}

impl AggregatorHealth {
    /// Healthy when at least one venue is enabled and every enabled venue is
    /// connected and fresh
    pub fn new(polymarket: ConnectionHealth, kalshi: ConnectionHealth) -> Self {
        let enabled: Vec<&ConnectionHealth> = [&polymarket, &kalshi]
            .into_iter()
            .filter(|h| h.enabled)
            .collect();
        let healthy = !enabled.is_empty() && enabled.iter().all(|h| h.connected && !h.is_stale);

        Self {
            polymarket,
            kalshi,
            healthy,
        }
    }
}

/// Manages both venue streams for one market and aggregates their books
pub struct MarketDataAggregator {
    polymarket: VenueStreamConnection<PolymarketFeed>,
    kalshi: VenueStreamConnection<KalshiFeed>,
    updates: broadcast::Sender<VenueEvent>,
    market: RwLock<Option<MarketPair>>,
}

impl MarketDataAggregator {
    /// Build both feeds from settings
    pub fn new(settings: &StreamSettings) -> CrossbookResult<Self> {
        let endpoints = &settings.endpoints;
        let client = KalshiClient::new(endpoints.kalshi_client(settings.stream.snapshot_timeout))?;

        Ok(Self::with_feeds(
            PolymarketFeed::new(endpoints.polymarket_feed()),
            KalshiFeed::new(endpoints.kalshi_feed(), client),
            settings.stream.clone(),
        ))
    }

    /// Create with explicit feeds
    pub fn with_feeds(polymarket: PolymarketFeed, kalshi: KalshiFeed, config: StreamConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Self {
            polymarket: VenueStreamConnection::new(polymarket, config.clone(), updates.clone()),
            kalshi: VenueStreamConnection::new(kalshi, config, updates.clone()),
            updates,
            market: RwLock::new(None),
        }
    }

    /// Select a market and (re)start both venue streams.
    ///
    /// A venue without an instrument for this market stays disabled.
    pub async fn enable(&self, market: MarketPair) {
        info!("[Aggregator] Enabling market {} ({})", market.id, market.title);

        let poly_instruments = market.instruments(Venue::Polymarket);
        let kalshi_instruments = market.instruments(Venue::Kalshi);
        *self.market.write() = Some(market);

        self.polymarket.enable(poly_instruments).await;
        self.kalshi.enable(kalshi_instruments).await;
    }

    /// Deselect the market: tear down both streams and clear both books
    pub async fn disable(&self) {
        info!("[Aggregator] Disabling all venue streams");
        *self.market.write() = None;
        self.polymarket.disable().await;
        self.kalshi.disable().await;
    }

    /// Currently selected market
    pub fn market(&self) -> Option<MarketPair> {
        self.market.read().clone()
    }

    /// Point-in-time copies of both books
    pub fn books(&self) -> VenueSplit<VenueOrderBook> {
        VenueSplit::new(self.polymarket.book(), self.kalshi.book())
    }

    /// Point-in-time copies of both connection states
    pub fn connection_states(&self) -> VenueSplit<VenueConnectionState> {
        VenueSplit::new(self.polymarket.state(), self.kalshi.state())
    }

    /// Merged ladder of both venues
    pub fn aggregate(&self) -> AggregatedOrderBook {
        let books = self.books();
        aggregate(&books.polymarket, &books.kalshi)
    }

    /// Best bid/ask, spread and mid of the merged ladder
    pub fn best_prices(&self) -> BestPrices {
        best_prices(&self.aggregate())
    }

    /// Simulate spending `amount` on `outcome` across both venues
    pub fn quote(&self, amount: Decimal, outcome: Outcome) -> Option<QuoteResult> {
        let books = self.books();
        calculate_quote(amount, outcome, &books.polymarket, &books.kalshi)
    }

    /// Subscribe to book and status events from both venues
    pub fn subscribe_updates(&self) -> broadcast::Receiver<VenueEvent> {
        self.updates.subscribe()
    }

    /// Health of both connections
    pub fn health(&self) -> AggregatorHealth {
        let now = Utc::now();
        let market = self.market();
        let enabled = |venue: Venue| {
            market
                .as_ref()
                .is_some_and(|m| !m.instruments(venue).is_empty())
        };

        AggregatorHealth::new(
            ConnectionHealth::evaluate(
                Venue::Polymarket,
                enabled(Venue::Polymarket),
                &self.polymarket.state(),
                self.polymarket.book().last_updated,
                now,
            ),
            ConnectionHealth::evaluate(
                Venue::Kalshi,
                enabled(Venue::Kalshi),
                &self.kalshi.state(),
                self.kalshi.book().last_updated,
                now,
            ),
        )
    }
}
