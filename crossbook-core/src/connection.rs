//! Venue connection lifecycle
//!
//! The transition rules of a venue stream, kept free of I/O so the stream
//! driver only has to feed it [`ConnectionEvent`]s and act on the returned
//! [`ReconnectDecision`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Heartbeat interval for every venue
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Fixed delay before a reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Failed cycles tolerated before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Upper bound for the one-off REST snapshot after connect
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the TCP connect plus WebSocket upgrade
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Silence after which an open transport is treated as dead
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Status of a venue connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

/// Time-ordered events observed on one venue's transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport open and subscription sent
    Opened,
    /// Text frame received
    Message(String),
    /// Connect or send failure
    Errored(String),
    /// Transport closed; `clean` only for an agreed normal closure
    Closed { clean: bool },
}

/// What the driver should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Keep going (or stop for good after a clean close)
    Stay,
    /// Schedule a reconnect after the fixed delay
    Retry,
    /// Attempt ceiling reached; wait to be re-enabled
    Exhausted,
}

/// Tunables of a venue stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub snapshot_timeout: Duration,
    pub connect_timeout: Duration,
    /// Ends the session when no inbound frame arrives for this long
    pub read_idle_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            snapshot_timeout: SNAPSHOT_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            read_idle_timeout: READ_IDLE_TIMEOUT,
        }
    }
}

/// Observable state of one venue connection.
///
/// `reconnect_attempts` resets only when the connection opens and grows by
/// exactly one per failed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueConnectionState {
    pub status: ConnectionStatus,
    pub last_connected: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub reconnect_attempts: u32,
}

impl VenueConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Enter `Connecting` (on enable or when a reconnect timer fires)
    pub fn begin_connecting(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    /// Apply one transport event
    pub fn handle(
        &mut self,
        event: &ConnectionEvent,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> ReconnectDecision {
        match event {
            ConnectionEvent::Opened => {
                self.status = ConnectionStatus::Connected;
                self.last_connected = Some(now);
                self.error_message = None;
                self.reconnect_attempts = 0;
                ReconnectDecision::Stay
            }
            ConnectionEvent::Message(_) => ReconnectDecision::Stay,
            ConnectionEvent::Errored(message) => {
                self.status = ConnectionStatus::Error;
                self.error_message = Some(message.clone());
                self.record_failure(max_attempts)
            }
            ConnectionEvent::Closed { clean: true } => {
                self.status = ConnectionStatus::Disconnected;
                ReconnectDecision::Stay
            }
            ConnectionEvent::Closed { clean: false } => {
                self.status = ConnectionStatus::Disconnected;
                self.record_failure(max_attempts)
            }
        }
    }

    /// Back to idle after the owner disabled the connection.
    /// The attempt counter is left alone; only a successful open clears it.
    pub fn mark_disabled(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    fn record_failure(&mut self, max_attempts: u32) -> ReconnectDecision {
        self.reconnect_attempts += 1;
        if self.reconnect_attempts < max_attempts {
            ReconnectDecision::Retry
        } else {
            ReconnectDecision::Exhausted
        }
    }
}
