//! Venue stream connection
//!
//! One background task per venue: connect, subscribe, optionally fetch a
//! REST snapshot, then read frames and send heartbeats until the transport
//! ends. Every session outcome goes through
//! [`VenueConnectionState::handle`], which decides whether to reconnect.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crossbook_core::{
    BookUpdate, ConnectionEvent, CrossbookError, ReconnectDecision, StreamConfig, Venue,
    VenueConnectionState, VenueEvent, VenueFeed, VenueOrderBook,
};

/// State shared between the handle and its background task
struct StreamShared {
    venue: Venue,
    book: RwLock<VenueOrderBook>,
    state: RwLock<VenueConnectionState>,
    updates: broadcast::Sender<VenueEvent>,
}

impl StreamShared {
    /// Mutate the connection state and publish the resulting status
    fn transition<R>(&self, f: impl FnOnce(&mut VenueConnectionState) -> R) -> R {
        let (result, event) = {
            let mut state = self.state.write();
            let result = f(&mut state);
            let event = VenueEvent::StatusChanged {
                venue: self.venue,
                status: state.status,
                error_message: state.error_message.clone(),
                reconnect_attempts: state.reconnect_attempts,
            };
            (result, event)
        };
        let _ = self.updates.send(event);
        result
    }

    /// Apply updates as one step and publish the new ladders
    fn apply(&self, updates: Vec<BookUpdate>) {
        if updates.is_empty() {
            return;
        }

        let now = Utc::now();
        let (bids, asks) = {
            let mut book = self.book.write();
            for update in updates {
                book.apply(update, now);
            }
            (book.bids.clone(), book.asks.clone())
        };

        let _ = self.updates.send(VenueEvent::BookUpdated {
            venue: self.venue,
            bids,
            asks,
            timestamp: now,
        });
    }

    fn clear(&self) {
        self.book.write().clear();
        let _ = self.updates.send(VenueEvent::BookUpdated {
            venue: self.venue,
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp: Utc::now(),
        });
    }
}

/// A resilient streaming session for one venue
pub struct VenueStreamConnection<F: VenueFeed> {
    feed: Arc<F>,
    config: StreamConfig,
    shared: Arc<StreamShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<F: VenueFeed> VenueStreamConnection<F> {
    /// Create an idle connection publishing to `updates`
    pub fn new(feed: F, config: StreamConfig, updates: broadcast::Sender<VenueEvent>) -> Self {
        let venue = feed.venue();
        Self {
            feed: Arc::new(feed),
            config,
            shared: Arc::new(StreamShared {
                venue,
                book: RwLock::new(VenueOrderBook::new()),
                state: RwLock::new(VenueConnectionState::new()),
                updates,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn venue(&self) -> Venue {
        self.shared.venue
    }

    /// Start streaming `instruments`, replacing any running session.
    ///
    /// An empty instrument list leaves the connection disabled.
    pub async fn enable(&self, instruments: Vec<String>) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.shared.clear();

        if instruments.is_empty() {
            self.shared.transition(|state| state.mark_disabled());
            return;
        }

        info!(
            "[{} WS] Enabling stream for {:?}",
            self.venue().display_name(),
            instruments
        );

        *task = Some(tokio::spawn(run_stream(
            Arc::clone(&self.feed),
            self.config.clone(),
            Arc::clone(&self.shared),
            instruments,
        )));
    }

    /// Tear down the transport and timers immediately and clear the book
    pub async fn disable(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            let _ = handle.await;
            info!("[{} WS] Stream disabled", self.venue().display_name());
        }

        self.shared.clear();
        self.shared.transition(|state| state.mark_disabled());
    }

    /// Whether a session task is alive (connected, connecting or waiting to retry)
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Copy of the current book
    pub fn book(&self) -> VenueOrderBook {
        self.shared.book.read().clone()
    }

    /// Copy of the current connection state
    pub fn state(&self) -> VenueConnectionState {
        self.shared.state.read().clone()
    }

    /// Subscribe to this connection's events
    pub fn subscribe(&self) -> broadcast::Receiver<VenueEvent> {
        self.shared.updates.subscribe()
    }
}

impl<F: VenueFeed> Drop for VenueStreamConnection<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Session loop: connect, run until the transport ends, then ask the state
/// machine whether to try again
async fn run_stream<F: VenueFeed>(
    feed: Arc<F>,
    config: StreamConfig,
    shared: Arc<StreamShared>,
    instruments: Vec<String>,
) {
    let name = shared.venue.display_name();

    loop {
        shared.transition(|state| state.begin_connecting());
        info!("[{} WS] Connecting to {}", name, feed.ws_url());

        let event = run_session(feed.as_ref(), &config, &shared, &instruments).await;

        let decision = shared.transition(|state| {
            state.handle(&event, config.max_reconnect_attempts, Utc::now())
        });
        let attempts = shared.state.read().reconnect_attempts;

        match decision {
            ReconnectDecision::Stay => {
                info!("[{} WS] Closed cleanly, not reconnecting", name);
                return;
            }
            ReconnectDecision::Retry => {
                warn!(
                    "[{} WS] Session ended ({:?}), reconnect attempt {}/{} in {:?}",
                    name, event, attempts, config.max_reconnect_attempts, config.reconnect_delay
                );
                sleep(config.reconnect_delay).await;
            }
            ReconnectDecision::Exhausted => {
                error!(
                    "[{} WS] Max reconnect attempts reached ({}), giving up until re-enabled",
                    name, attempts
                );
                return;
            }
        }
    }
}

/// Session-ending transport failure, reported through the state machine
fn transport_failure(msg: String) -> ConnectionEvent {
    ConnectionEvent::Errored(CrossbookError::transport(msg).to_string())
}

/// One transport lifetime. Returns the event that ended it.
async fn run_session<F: VenueFeed>(
    feed: &F,
    config: &StreamConfig,
    shared: &StreamShared,
    instruments: &[String],
) -> ConnectionEvent {
    let name = shared.venue.display_name();

    let ws_stream = match timeout(config.connect_timeout, connect_async(feed.ws_url())).await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            error!("[{} WS] Connection failed: {}", name, e);
            return transport_failure(format!("WebSocket connection failed: {}", e));
        }
        Err(_) => {
            error!(
                "[{} WS] Connection timed out after {:?}",
                name, config.connect_timeout
            );
            return transport_failure(format!(
                "WebSocket connection timed out after {:?}",
                config.connect_timeout
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let subscribe = match feed.subscribe_message(instruments) {
        Ok(msg) => msg,
        Err(e) => return ConnectionEvent::Errored(e.to_string()),
    };
    if let Err(e) = write.send(Message::Text(subscribe.into())).await {
        error!("[{} WS] Failed to subscribe: {}", name, e);
        return transport_failure(format!("Failed to subscribe: {}", e));
    }
    info!("[{} WS] Subscribed to {:?}", name, instruments);

    shared.transition(|state| {
        state.handle(&ConnectionEvent::Opened, config.max_reconnect_attempts, Utc::now())
    });

    if feed.needs_initial_snapshot() {
        if let Some(instrument) = instruments.first() {
            match timeout(config.snapshot_timeout, feed.fetch_snapshot(instrument)).await {
                Ok(Ok(update)) => {
                    info!("[{} WS] Initial orderbook loaded", name);
                    shared.apply(vec![update]);
                }
                Ok(Err(e)) => warn!("[{} WS] Failed to fetch initial orderbook: {}", name, e),
                Err(_) => warn!(
                    "[{} WS] Initial orderbook fetch timed out after {:?}",
                    name, config.snapshot_timeout
                ),
            }
        }
    }

    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    let idle = sleep(config.read_idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            msg = read.next() => {
                if matches!(msg, Some(Ok(_))) {
                    idle.as_mut().reset(Instant::now() + config.read_idle_timeout);
                }

                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match feed.parse_message(text.as_str(), instruments) {
                            Ok(updates) => shared.apply(updates),
                            Err(e) => warn!("[{} WS] Dropping frame: {}", name, e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            debug!("[{} WS] Failed to send pong: {}", name, e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let clean = frame
                            .as_ref()
                            .is_some_and(|f| f.code == CloseCode::Normal);
                        info!("[{} WS] Connection closed by server ({:?})", name, frame);
                        return ConnectionEvent::Closed { clean };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("[{} WS] Error: {}", name, e);
                        return transport_failure(format!("WebSocket error: {}", e));
                    }
                    None => {
                        warn!("[{} WS] Stream ended without close frame", name);
                        return ConnectionEvent::Closed { clean: false };
                    }
                }
            }

            _ = &mut idle => {
                warn!(
                    "[{} WS] No frames for {:?}, dropping connection",
                    name, config.read_idle_timeout
                );
                return ConnectionEvent::Closed { clean: false };
            }

            _ = heartbeat.tick() => {
                if let Err(e) = write.send(Message::Text(feed.ping_message().into())).await {
                    debug!("[{} WS] Heartbeat failed: {}", name, e);
                }
            }
        }
    }
}
