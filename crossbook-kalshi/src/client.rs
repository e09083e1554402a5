//! DFlow REST client for Kalshi order books
//!
//! The stream only carries level changes, so every (re)connect starts from a
//! full book fetched here.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crossbook_core::{BookUpdate, CrossbookError, CrossbookResult, UpdateKind};

use crate::types::OrderbookMessage;

/// Base URL for the DFlow prediction-markets API
pub const DFLOW_API_BASE: &str = "https://dev-prediction-markets-api.dflow.net/api/v1";

/// Configuration for KalshiClient
#[derive(Debug, Clone)]
pub struct KalshiClientConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for KalshiClientConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("DFLOW_API_URL").unwrap_or_else(|_| DFLOW_API_BASE.to_string()),
            api_key: std::env::var("DFLOW_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Kalshi order book client (via DFlow)
#[derive(Clone)]
pub struct KalshiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl KalshiClient {
    pub fn new(config: KalshiClientConfig) -> CrossbookResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrossbookError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn orderbook_url(&self, ticker: &str) -> String {
        format!("{}/orderbook/{}", self.base_url, ticker)
    }

    /// Fetch the full order book for a ticker, normalized to a snapshot
    #[instrument(skip(self))]
    pub async fn get_orderbook(&self, ticker: &str) -> CrossbookResult<BookUpdate> {
        let url = self.orderbook_url(ticker);

        debug!("[Kalshi WS] Fetching orderbook snapshot from: {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CrossbookError::network(format!("Failed to fetch orderbook: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CrossbookError::api(format!(
                "DFlow API error ({}): {}",
                status, body
            )));
        }

        let orderbook: OrderbookMessage = response
            .json()
            .await
            .map_err(|e| CrossbookError::parse(format!("Failed to parse orderbook: {}", e)))?;

        orderbook.to_book_update(UpdateKind::Snapshot)
    }
}
