//! The venue-specific half of a stream connection
//!
//! A [`VenueFeed`] knows one venue's wire protocol: where to connect, what to
//! send, and how to turn inbound frames into normalized [`BookUpdate`]s. The
//! connection driver owns everything else (transport, timers, book state).

use async_trait::async_trait;

use crate::error::{CrossbookError, CrossbookResult};
use crate::market::BookUpdate;
use crate::platform::Venue;

#[async_trait]
pub trait VenueFeed: Send + Sync + 'static {
    fn venue(&self) -> Venue;

    /// WebSocket endpoint
    fn ws_url(&self) -> &str;

    /// Subscription frame sent right after the transport opens
    fn subscribe_message(&self, instruments: &[String]) -> CrossbookResult<String>;

    /// Keepalive frame sent on every heartbeat tick
    fn ping_message(&self) -> String;

    /// Parse one inbound text frame.
    ///
    /// `instruments` are the ids the session subscribed to; content tagged
    /// with any other instrument is skipped. `Ok(vec![])` means the frame
    /// carries nothing for the book (keepalive replies, acknowledgements,
    /// other channels or instruments). `Err` is a protocol parse error; the
    /// caller drops the frame.
    fn parse_message(
        &self,
        text: &str,
        instruments: &[String],
    ) -> CrossbookResult<Vec<BookUpdate>>;

    /// Whether the stream only carries deltas and needs a REST snapshot
    /// after every connect
    fn needs_initial_snapshot(&self) -> bool {
        false
    }

    /// Fetch the full book for `instrument` out of band
    async fn fetch_snapshot(&self, instrument: &str) -> CrossbookResult<BookUpdate> {
        Err(CrossbookError::internal(format!(
            "{} does not serve snapshots for {}",
            self.venue(),
            instrument
        )))
    }
}
