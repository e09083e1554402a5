//! Environment-driven settings for the venue streams

use std::time::Duration;

use url::Url;

use crossbook_core::{CrossbookError, CrossbookResult, StreamConfig};
use crossbook_kalshi::{KalshiClientConfig, KalshiFeedConfig, DFLOW_API_BASE, DFLOW_WS_URL};
use crossbook_polymarket::{PolymarketFeedConfig, POLYMARKET_WS_URL};

/// Venue endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub polymarket_ws_url: String,
    pub dflow_ws_url: String,
    pub dflow_api_url: String,
    pub dflow_api_key: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            polymarket_ws_url: POLYMARKET_WS_URL.to_string(),
            dflow_ws_url: DFLOW_WS_URL.to_string(),
            dflow_api_url: DFLOW_API_BASE.to_string(),
            dflow_api_key: None,
        }
    }
}

impl EndpointSettings {
    pub fn polymarket_feed(&self) -> PolymarketFeedConfig {
        PolymarketFeedConfig {
            ws_url: self.polymarket_ws_url.clone(),
        }
    }

    pub fn kalshi_feed(&self) -> KalshiFeedConfig {
        KalshiFeedConfig {
            ws_url: self.dflow_ws_url.clone(),
        }
    }

    pub fn kalshi_client(&self, timeout: Duration) -> KalshiClientConfig {
        KalshiClientConfig {
            api_url: self.dflow_api_url.clone(),
            api_key: self.dflow_api_key.clone(),
            timeout,
        }
    }
}

/// Stream tunables plus endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSettings {
    pub stream: StreamConfig,
    pub endpoints: EndpointSettings,
}

impl StreamSettings {
    /// Read settings from the process environment
    pub fn from_env() -> CrossbookResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset or empty keys keep their defaults
    pub fn from_lookup<L>(lookup: L) -> CrossbookResult<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = StreamConfig::default();

        let stream = StreamConfig {
            heartbeat_interval: parse_number(&get, "CROSSBOOK_HEARTBEAT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            reconnect_delay: parse_number(&get, "CROSSBOOK_RECONNECT_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
            max_reconnect_attempts: parse_number(&get, "CROSSBOOK_MAX_RECONNECT_ATTEMPTS")?
                .map(u32::try_from)
                .transpose()
                .map_err(|_| {
                    CrossbookError::config("CROSSBOOK_MAX_RECONNECT_ATTEMPTS is out of range")
                })?
                .unwrap_or(defaults.max_reconnect_attempts),
            snapshot_timeout: parse_number(&get, "CROSSBOOK_SNAPSHOT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.snapshot_timeout),
            connect_timeout: parse_number(&get, "CROSSBOOK_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            read_idle_timeout: parse_number(&get, "CROSSBOOK_READ_IDLE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_idle_timeout),
        };

        for (key, value) in [
            ("CROSSBOOK_HEARTBEAT_SECS", stream.heartbeat_interval),
            ("CROSSBOOK_CONNECT_TIMEOUT_SECS", stream.connect_timeout),
            ("CROSSBOOK_READ_IDLE_TIMEOUT_SECS", stream.read_idle_timeout),
        ] {
            if value.is_zero() {
                return Err(CrossbookError::config(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }

        let endpoints = EndpointSettings {
            polymarket_ws_url: parse_url(&get, "POLYMARKET_WS_URL", POLYMARKET_WS_URL)?,
            dflow_ws_url: parse_url(&get, "DFLOW_WS_URL", DFLOW_WS_URL)?,
            dflow_api_url: parse_url(&get, "DFLOW_API_URL", DFLOW_API_BASE)?,
            dflow_api_key: get("DFLOW_API_KEY"),
        };

        Ok(Self { stream, endpoints })
    }
}

fn parse_number<G>(get: &G, key: &str) -> CrossbookResult<Option<u64>>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|e| CrossbookError::config(format!("{} = '{}': {}", key, raw, e)))
        })
        .transpose()
}

fn parse_url<G>(get: &G, key: &str, default: &str) -> CrossbookResult<String>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|e| CrossbookError::config(format!("{} = '{}': {}", key, raw, e)))?;
    Ok(raw)
}
