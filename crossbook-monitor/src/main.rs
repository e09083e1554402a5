//! Cross-venue order book monitor
//!
//! Streams Polymarket and Kalshi books for one market and logs the merged
//! top of book and a standing quote whenever either book changes.

use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crossbook_core::{
    format_price, format_size, venue_size, BestPrices, MarketPair, Outcome, Venue, VenueEvent,
};
use crossbook_services::{AggregatorHealth, MarketDataAggregator, StreamSettings};

/// How often to log connection health
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Standing quote logged on every book change
#[derive(Debug, Clone, PartialEq)]
struct QuoteSettings {
    amount: Decimal,
    outcome: Outcome,
}

impl QuoteSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let amount = match lookup("CROSSBOOK_QUOTE_AMOUNT") {
            Some(raw) => raw
                .trim()
                .parse::<Decimal>()
                .with_context(|| format!("CROSSBOOK_QUOTE_AMOUNT = '{}'", raw))?,
            None => Decimal::ONE_HUNDRED,
        };
        let outcome = match lookup("CROSSBOOK_QUOTE_OUTCOME") {
            Some(raw) => raw.parse::<Outcome>().map_err(anyhow::Error::msg)?,
            None => Outcome::Yes,
        };

        Ok(Self { amount, outcome })
    }
}

fn price_or_dash(price: Option<Decimal>) -> String {
    price.map(format_price).unwrap_or_else(|| "-".to_string())
}

/// One line summary of the merged top of book
fn describe_top(best: &BestPrices) -> String {
    format!(
        "bid {} | ask {} | spread {} | mid {}",
        price_or_dash(best.best_bid),
        price_or_dash(best.best_ask),
        price_or_dash(best.spread),
        price_or_dash(best.mid_price),
    )
}

fn log_book(aggregator: &MarketDataAggregator, quote: &QuoteSettings, venue: Venue) {
    let book = aggregator.aggregate();
    let best = aggregator.best_prices();
    info!("[Aggregator] {} update: {}", venue, describe_top(&best));

    for (side, level) in [("bid", book.bids.first()), ("ask", book.asks.first())] {
        if let Some(level) = level {
            debug!(
                "[Aggregator] top {} {} {} (Polymarket {} / Kalshi {})",
                side,
                format_price(level.price),
                format_size(level.total_size),
                format_size(venue_size(level, Venue::Polymarket)),
                format_size(venue_size(level, Venue::Kalshi)),
            );
        }
    }

    match aggregator.quote(quote.amount, quote.outcome) {
        Some(result) => info!(
            "[Aggregator] {} on {}: {} shares @ {} avg (spent {}; Polymarket {} / Kalshi {})",
            format_size(quote.amount),
            quote.outcome,
            result.total_shares.round_dp(2),
            format_price(result.average_price),
            format_size(result.total_spent),
            result.breakdown.polymarket.shares.round_dp(2),
            result.breakdown.kalshi.shares.round_dp(2),
        ),
        None => debug!(
            "[Aggregator] {} on {}: no liquidity",
            format_size(quote.amount),
            quote.outcome
        ),
    }
}

fn log_health(health: &AggregatorHealth) {
    for h in [&health.polymarket, &health.kalshi] {
        if !h.enabled {
            continue;
        }
        info!(
            "[Aggregator] {} health: {} | stale: {} | reconnects: {} | last update: {}",
            h.venue,
            h.status.label(),
            h.is_stale,
            h.reconnect_attempts,
            h.last_update
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
    if !health.healthy {
        warn!("[Aggregator] Not all enabled venues are healthy");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,crossbook_monitor=debug")),
        )
        .init();

    let settings = StreamSettings::from_env().context("Invalid stream settings")?;
    let quote = QuoteSettings::from_lookup(|key| std::env::var(key).ok())?;
    let market = MarketPair::from_env();

    info!("Starting cross-venue order book monitor for {}", market.title);

    let aggregator = MarketDataAggregator::new(&settings)?;
    let mut updates = aggregator.subscribe_updates();
    aggregator.enable(market).await;

    let mut health_timer = tokio::time::interval_at(
        tokio::time::Instant::now() + HEALTH_LOG_INTERVAL,
        HEALTH_LOG_INTERVAL,
    );
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = updates.recv() => match event {
                Ok(VenueEvent::BookUpdated { venue, .. }) => log_book(&aggregator, &quote, venue),
                Ok(VenueEvent::StatusChanged { venue, status, error_message, reconnect_attempts }) => {
                    info!(
                        "[Aggregator] {} {} (attempts: {}){}",
                        venue,
                        status.label(),
                        reconnect_attempts,
                        error_message.map(|e| format!(": {}", e)).unwrap_or_default(),
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[Aggregator] Monitor lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = health_timer.tick() => log_health(&aggregator.health()),
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    aggregator.disable().await;
    Ok(())
}
