//! Events pushed to listeners of the venue streams
//!
//! Every applied book change and every status transition of a venue
//! connection is published as a [`VenueEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionStatus;
use crate::market::PriceLevel;
use crate::platform::Venue;

/// Messages delivered to every listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueEvent {
    /// A venue's book changed; carries the full post-update ladders
    BookUpdated {
        venue: Venue,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp: DateTime<Utc>,
    },
    /// A venue connection changed status
    StatusChanged {
        venue: Venue,
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        reconnect_attempts: u32,
    },
}

impl VenueEvent {
    /// Venue the event belongs to
    pub fn venue(&self) -> Venue {
        match self {
            Self::BookUpdated { venue, .. } => *venue,
            Self::StatusChanged { venue, .. } => *venue,
        }
    }
}
