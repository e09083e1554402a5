//! VenueStreamConnection against an in-process WebSocket server

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crossbook_core::{
    BookUpdate, ConnectionStatus, CrossbookError, CrossbookResult, PriceLevel, StreamConfig,
    Venue, VenueEvent, VenueFeed,
};
use crossbook_polymarket::{PolymarketFeed, PolymarketFeedConfig};
use crossbook_services::VenueStreamConnection;

type ServerSocket = WebSocketStream<TcpStream>;

const BOOK: &str = r#"{
    "event_type": "book",
    "asset_id": "token-1",
    "bids": [{"price": "0.48", "size": "100"}, {"price": "0.47", "size": "50"}],
    "asks": [{"price": "0.52", "size": "40"}]
}"#;

const PRICE_CHANGE: &str = r#"{
    "event_type": "price_change",
    "asset_id": "token-1",
    "changes": [
        {"price": "0.47", "size": "0", "side": "BUY"},
        {"price": "0.53", "size": "10", "side": "SELL"}
    ]
}"#;

/// Accept connections until the test ends, handing each one to `handler`
/// along with its zero-based index. Returns the URL and the accept counter.
async fn spawn_server<H, Fut>(handler: H) -> (String, Arc<AtomicUsize>)
where
    H: Fn(ServerSocket, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    handler(ws, index).await;
                }
            });
        }
    });

    (format!("ws://{}", addr), accepted)
}

async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

/// Keep the socket open until the client goes away
async fn hold(mut ws: ServerSocket) {
    while let Some(Ok(_)) = ws.next().await {}
}

async fn close_with(mut ws: ServerSocket, code: CloseCode) {
    ws.close(Some(CloseFrame {
        code,
        reason: "bye".into(),
    }))
    .await
    .unwrap();
    while ws.next().await.is_some() {}
}

fn test_config() -> StreamConfig {
    StreamConfig {
        heartbeat_interval: Duration::from_secs(30),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_attempts: 3,
        snapshot_timeout: Duration::from_secs(1),
        connect_timeout: Duration::from_secs(2),
        read_idle_timeout: Duration::from_secs(30),
    }
}

fn polymarket_feed(url: &str) -> PolymarketFeed {
    PolymarketFeed::new(PolymarketFeedConfig {
        ws_url: url.to_string(),
    })
}

fn connection<F: VenueFeed>(feed: F, config: StreamConfig) -> VenueStreamConnection<F> {
    let (updates, _) = broadcast::channel(1024);
    VenueStreamConnection::new(feed, config, updates)
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    timeout(Duration::from_secs(5), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Polymarket feed that also serves a fixed REST snapshot
struct SnapshotFeed {
    inner: PolymarketFeed,
    snapshot: Option<BookUpdate>,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl VenueFeed for SnapshotFeed {
    fn venue(&self) -> Venue {
        self.inner.venue()
    }

    fn ws_url(&self) -> &str {
        self.inner.ws_url()
    }

    fn subscribe_message(&self, instruments: &[String]) -> CrossbookResult<String> {
        self.inner.subscribe_message(instruments)
    }

    fn ping_message(&self) -> String {
        self.inner.ping_message()
    }

    fn parse_message(
        &self,
        text: &str,
        instruments: &[String],
    ) -> CrossbookResult<Vec<BookUpdate>> {
        self.inner.parse_message(text, instruments)
    }

    fn needs_initial_snapshot(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self, _instrument: &str) -> CrossbookResult<BookUpdate> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .clone()
            .ok_or_else(|| CrossbookError::api("snapshot unavailable"))
    }
}

#[tokio::test]
async fn test_subscribes_and_applies_book_frames() {
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
    let (url, accepted) = spawn_server(move |mut ws, _| {
        let sub_tx = sub_tx.clone();
        async move {
            let _ = sub_tx.send(next_text(&mut ws).await);
            ws.send(Message::Text(BOOK.into())).await.unwrap();
            ws.send(Message::Text(PRICE_CHANGE.into())).await.unwrap();
            hold(ws).await;
        }
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    let subscribe = timeout(Duration::from_secs(5), sub_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let subscribe: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
    assert_eq!(subscribe["type"], "market");
    assert_eq!(subscribe["assets_ids"][0], "token-1");

    assert!(eventually(|| conn.book().asks.len() == 2).await);

    let book = conn.book();
    assert_eq!(book.bids.len(), 1);
    assert_eq!(book.best_bid(), Some(dec!(48)));
    assert_eq!(book.best_ask(), Some(dec!(52)));
    assert_eq!(book.asks[1].price, dec!(53));
    assert!(book.last_updated.is_some());

    let state = conn.state();
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    conn.disable().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_drop_connection() {
    let (url, accepted) = spawn_server(|mut ws, _| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"bids": "x", "asks": []}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(BOOK.into())).await.unwrap();
        hold(ws).await;
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| !conn.book().is_empty()).await);
    assert_eq!(conn.state().status, ConnectionStatus::Connected);
    assert_eq!(conn.state().reconnect_attempts, 0);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    conn.disable().await;
}

#[tokio::test]
async fn test_clean_close_does_not_reconnect() {
    let (url, accepted) = spawn_server(|mut ws, _| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text(BOOK.into())).await.unwrap();
        close_with(ws, CloseCode::Normal).await;
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(
        eventually(|| {
            let state = conn.state();
            state.last_connected.is_some() && state.status == ConnectionStatus::Disconnected
        })
        .await
    );

    sleep(Duration::from_millis(150)).await;

    assert!(!conn.is_running().await);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(conn.state().reconnect_attempts, 0);
    // last known book survives the close
    assert_eq!(conn.book().best_bid(), Some(dec!(48)));
}

#[tokio::test]
async fn test_abnormal_close_reconnects_and_resets_counter() {
    let (url, accepted) = spawn_server(|mut ws, index| async move {
        next_text(&mut ws).await;
        if index == 0 {
            close_with(ws, CloseCode::Away).await;
        } else {
            ws.send(Message::Text(BOOK.into())).await.unwrap();
            hold(ws).await;
        }
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    let mut events = conn.subscribe();
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(
        eventually(|| {
            accepted.load(Ordering::SeqCst) == 2
                && conn.state().is_connected()
                && !conn.book().is_empty()
        })
        .await
    );
    assert_eq!(conn.state().reconnect_attempts, 0);

    let mut saw_retry = false;
    while let Ok(event) = events.try_recv() {
        if let VenueEvent::StatusChanged {
            reconnect_attempts: 1,
            status: ConnectionStatus::Disconnected,
            ..
        } = event
        {
            saw_retry = true;
        }
    }
    assert!(saw_retry);

    conn.disable().await;
}

#[tokio::test]
async fn test_exhausted_attempts_stop_retrying() {
    // nothing listens on this port once the listener is dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let conn = connection(polymarket_feed(&url), test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| conn.state().reconnect_attempts == 3).await);
    sleep(Duration::from_millis(100)).await;

    let state = conn.state();
    assert!(!conn.is_running().await);
    assert_eq!(state.reconnect_attempts, 3);
    assert_eq!(state.status, ConnectionStatus::Error);
    assert!(state
        .error_message
        .as_deref()
        .is_some_and(|msg| msg.starts_with("Transport error")));
    assert!(state.last_connected.is_none());
}

#[tokio::test]
async fn test_stalled_handshake_times_out_and_retries() {
    // accepts TCP but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let config = StreamConfig {
        connect_timeout: Duration::from_millis(100),
        reconnect_delay: Duration::from_millis(10),
        ..test_config()
    };
    let conn = connection(polymarket_feed(&url), config);
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| conn.state().reconnect_attempts == 3).await);
    sleep(Duration::from_millis(100)).await;

    let state = conn.state();
    assert!(!conn.is_running().await);
    assert_eq!(state.status, ConnectionStatus::Error);
    assert!(state
        .error_message
        .as_deref()
        .is_some_and(|msg| msg.contains("timed out")));
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_silent_connection_is_dropped_and_reopened() {
    let (url, accepted) = spawn_server(|mut ws, index| async move {
        next_text(&mut ws).await;
        if index > 0 {
            ws.send(Message::Text(BOOK.into())).await.unwrap();
        }
        hold(ws).await;
    })
    .await;

    let config = StreamConfig {
        read_idle_timeout: Duration::from_millis(200),
        ..test_config()
    };
    let conn = connection(polymarket_feed(&url), config);
    let mut events = conn.subscribe();
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(
        eventually(|| {
            accepted.load(Ordering::SeqCst) >= 2 && !conn.book().is_empty()
        })
        .await
    );

    let mut saw_drop = false;
    while let Ok(event) = events.try_recv() {
        if let VenueEvent::StatusChanged {
            reconnect_attempts: 1,
            status: ConnectionStatus::Disconnected,
            ..
        } = event
        {
            saw_drop = true;
        }
    }
    assert!(saw_drop);

    conn.disable().await;
}

#[tokio::test]
async fn test_frames_for_other_tokens_leave_book_alone() {
    let (url, _) = spawn_server(|mut ws, _| async move {
        next_text(&mut ws).await;
        let foreign_book = r#"{
            "event_type": "book",
            "asset_id": "token-2",
            "bids": [{"price": "0.10", "size": "999"}],
            "asks": []
        }"#;
        let mixed = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "token-2", "price": "0.30", "size": "5", "side": "BUY"},
                {"asset_id": "token-1", "price": "0.53", "size": "10", "side": "SELL"}
            ]
        }"#;
        ws.send(Message::Text(BOOK.into())).await.unwrap();
        ws.send(Message::Text(foreign_book.into())).await.unwrap();
        ws.send(Message::Text(mixed.into())).await.unwrap();
        hold(ws).await;
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| conn.book().asks.len() == 2).await);

    let book = conn.book();
    assert_eq!(book.bids.len(), 2);
    assert_eq!(book.best_bid(), Some(dec!(48)));
    assert!(book.bids.iter().all(|level| level.price != dec!(30)));
    assert_eq!(book.asks[1].price, dec!(53));

    conn.disable().await;
}

#[tokio::test]
async fn test_disable_tears_down_and_clears_book() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let (url, accepted) = spawn_server(move |mut ws, _| {
        let closed_tx = closed_tx.clone();
        async move {
            next_text(&mut ws).await;
            ws.send(Message::Text(BOOK.into())).await.unwrap();
            hold(ws).await;
            let _ = closed_tx.send(());
        }
    })
    .await;

    let conn = connection(polymarket_feed(&url), test_config());
    let mut events = conn.subscribe();
    conn.enable(vec!["token-1".to_string()]).await;
    assert!(eventually(|| !conn.book().is_empty()).await);

    conn.disable().await;

    let book = conn.book();
    assert!(book.is_empty());
    assert!(book.last_updated.is_none());
    assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
    assert!(!conn.is_running().await);
    assert!(timeout(Duration::from_secs(2), closed_rx.recv()).await.is_ok());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    let mut last_book = None;
    while let Ok(event) = events.try_recv() {
        if let VenueEvent::BookUpdated { bids, asks, .. } = event {
            last_book = Some((bids, asks));
        }
    }
    let (bids, asks) = last_book.unwrap();
    assert!(bids.is_empty() && asks.is_empty());
}

#[tokio::test]
async fn test_initial_snapshot_applied_before_deltas() {
    let (url, _) = spawn_server(|mut ws, _| async move {
        next_text(&mut ws).await;
        let delta = r#"{"changes": [{"price": "0.60", "size": "5", "side": "SELL"}]}"#;
        ws.send(Message::Text(delta.into())).await.unwrap();
        hold(ws).await;
    })
    .await;

    let fetches = Arc::new(AtomicUsize::new(0));
    let feed = SnapshotFeed {
        inner: polymarket_feed(&url),
        snapshot: Some(BookUpdate::snapshot(
            vec![PriceLevel::new(dec!(40), dec!(25), Venue::Polymarket)],
            vec![],
        )),
        fetches: Arc::clone(&fetches),
    };

    let conn = connection(feed, test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| conn.book().asks.len() == 1).await);

    let book = conn.book();
    assert_eq!(book.best_bid(), Some(dec!(40)));
    assert_eq!(book.bids[0].size, dec!(25));
    assert_eq!(book.best_ask(), Some(dec!(60)));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    conn.disable().await;
}

#[tokio::test]
async fn test_failed_snapshot_keeps_connection_up() {
    let (url, accepted) = spawn_server(|mut ws, _| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text(BOOK.into())).await.unwrap();
        hold(ws).await;
    })
    .await;

    let fetches = Arc::new(AtomicUsize::new(0));
    let feed = SnapshotFeed {
        inner: polymarket_feed(&url),
        snapshot: None,
        fetches: Arc::clone(&fetches),
    };

    let conn = connection(feed, test_config());
    conn.enable(vec!["token-1".to_string()]).await;

    assert!(eventually(|| !conn.book().is_empty()).await);
    assert_eq!(conn.state().status, ConnectionStatus::Connected);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    conn.disable().await;
}

#[tokio::test]
async fn test_heartbeat_sends_ping() {
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    let (url, _) = spawn_server(move |mut ws, _| {
        let ping_tx = ping_tx.clone();
        async move {
            next_text(&mut ws).await;
            let _ = ping_tx.send(next_text(&mut ws).await);
            hold(ws).await;
        }
    })
    .await;

    let config = StreamConfig {
        heartbeat_interval: Duration::from_millis(50),
        ..test_config()
    };
    let conn = connection(polymarket_feed(&url), config);
    conn.enable(vec!["token-1".to_string()]).await;

    let ping = timeout(Duration::from_secs(5), ping_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let ping: serde_json::Value = serde_json::from_str(&ping).unwrap();
    assert_eq!(ping["type"], "ping");

    conn.disable().await;
}

#[tokio::test]
async fn test_empty_instruments_leave_connection_disabled() {
    let conn = connection(polymarket_feed("ws://127.0.0.1:1"), test_config());

    conn.enable(Vec::new()).await;

    assert!(!conn.is_running().await);
    assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
}
