//! Reconnecting WebSocket price feed
//!
//! Owns the single upstream connection, replays every active subscription
//! after a reconnect, and fans incoming samples out to local listeners.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use tickstream_core::{ClientMessage, ConnectionState, PriceSample, ServerMessage, Symbol};

use crate::listeners::{BookAction, ListenerBook, ListenerHandle};

/// Ceiling for the exponential reconnect backoff
const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(30);

/// Configuration for the price feed client
#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    /// WebSocket endpoint of the price server
    pub url: String,
    /// Whether to reconnect automatically after a drop
    pub auto_reconnect: bool,
    /// Base delay for the exponential reconnect backoff
    pub reconnect_delay: Duration,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3001/ws".to_string(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Commands sent to the connection task
#[derive(Debug)]
enum FeedCommand {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

/// Client-side subscription manager over one upstream WebSocket.
///
/// Any number of local listeners share a single transport subscription per
/// symbol. The underlying connection is opened lazily on the first
/// subscribe, and after a reconnect every symbol with live listeners is
/// resubscribed without caller intervention.
///
/// Must be used from within a Tokio runtime.
pub struct PriceFeedClient {
    config: PriceFeedConfig,
    book: Arc<ListenerBook>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<FeedCommand>>>,
    status_tx: watch::Sender<ConnectionState>,
    status_rx: watch::Receiver<ConnectionState>,
}

impl PriceFeedClient {
    /// Create a client; no connection is made until the first subscribe
    pub fn new(config: PriceFeedConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            book: Arc::new(ListenerBook::new()),
            command_tx: Mutex::new(None),
            status_tx,
            status_rx,
        }
    }

    /// Register a callback for a symbol's price updates.
    ///
    /// The first listener for a symbol issues one transport-level subscribe
    /// (lazily opening the connection); further listeners share it.
    pub fn subscribe(
        &self,
        symbol: impl Into<Symbol>,
        callback: impl Fn(&PriceSample) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let (handle, action) = self.book.register(symbol.into(), callback);
        self.apply_action(action);
        handle
    }

    /// Remove a listener by handle.
    ///
    /// When the last listener for a symbol goes away, one transport-level
    /// unsubscribe is issued. Removing a stale handle is a no-op.
    pub fn unsubscribe(&self, handle: &ListenerHandle) {
        let action = self.book.remove(handle);
        self.apply_action(action);
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.status_rx.borrow()
    }

    /// Watch connection state changes (reconnects surface here as a
    /// transient `Disconnected`, never as an error to listeners)
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    fn apply_action(&self, action: BookAction) {
        match action {
            BookAction::SendSubscribe(symbol) => {
                self.ensure_connection();
                self.send_command(FeedCommand::Subscribe(symbol));
            }
            BookAction::SendUnsubscribe(symbol) => {
                self.send_command(FeedCommand::Unsubscribe(symbol));
            }
            BookAction::None => {}
        }
    }

    /// Spawn the connection task on first use
    fn ensure_connection(&self) {
        let mut guard = self.command_tx.lock();
        if guard.is_some() {
            return;
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *guard = Some(command_tx);

        let config = self.config.clone();
        let book = Arc::clone(&self.book);
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            connection_loop(config, book, command_rx, status_tx).await;
        });
    }

    fn send_command(&self, command: FeedCommand) {
        let guard = self.command_tx.lock();
        if let Some(ref tx) = *guard {
            let _ = tx.send(command);
        }
    }
}

impl std::fmt::Debug for PriceFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeedClient")
            .field("config", &self.config)
            .field("state", &self.connection_state())
            .finish()
    }
}

/// Main connection loop with reconnection logic.
///
/// Waits for the first subscribe before dialing, so an idle client never
/// holds a connection open. On every (re)connect, the symbols that still
/// have listeners are resubscribed from the book; queued commands are
/// deduplicated against that replay so each symbol carries at most one
/// outstanding transport subscription.
async fn connection_loop(
    config: PriceFeedConfig,
    book: Arc<ListenerBook>,
    mut command_rx: mpsc::UnboundedReceiver<FeedCommand>,
    status_tx: watch::Sender<ConnectionState>,
) {
    // Lazy connection: wait for a subscription before dialing
    debug!("Waiting for the first subscription before connecting");
    loop {
        match command_rx.recv().await {
            Some(FeedCommand::Subscribe(_)) => break,
            Some(FeedCommand::Unsubscribe(_)) => continue,
            None => return,
        }
    }

    let mut reconnect_attempts = 0u32;

    loop {
        let _ = status_tx.send(ConnectionState::Connecting);
        info!("Connecting to {}", config.url);

        match connect_async(config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Connected to price feed");
                reconnect_attempts = 0;
                let _ = status_tx.send(ConnectionState::Connected);

                let (mut write, mut read) = ws_stream.split();

                // One subscribe per symbol with live listeners; the `active`
                // set also filters stale queued commands
                let mut active: HashSet<Symbol> = HashSet::new();
                let mut send_failed = false;
                for symbol in book.replay_symbols() {
                    if send_control(&mut write, &ClientMessage::Subscribe {
                        symbol: symbol.clone(),
                    })
                    .await
                    .is_err()
                    {
                        send_failed = true;
                        break;
                    }
                    active.insert(symbol);
                }

                if !send_failed {
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => handle_text(&text, &book),
                                Some(Ok(Message::Ping(data))) => {
                                    if write.send(Message::Pong(data)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    info!("Connection closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("WebSocket error: {}", e);
                                    break;
                                }
                                None => {
                                    info!("Stream ended");
                                    break;
                                }
                                _ => {}
                            },

                            cmd = command_rx.recv() => match cmd {
                                Some(FeedCommand::Subscribe(symbol)) => {
                                    if active.insert(symbol.clone()) {
                                        if send_control(&mut write, &ClientMessage::Subscribe { symbol })
                                            .await
                                            .is_err()
                                        {
                                            break;
                                        }
                                    }
                                }
                                Some(FeedCommand::Unsubscribe(symbol)) => {
                                    if active.remove(&symbol) {
                                        if send_control(&mut write, &ClientMessage::Unsubscribe { symbol })
                                            .await
                                            .is_err()
                                        {
                                            break;
                                        }
                                    }
                                }
                                // Client dropped; shut the task down
                                None => return,
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!("Connection failed: {}", e);
            }
        }

        let _ = status_tx.send(ConnectionState::Disconnected);

        // Drain commands queued while disconnected: the replay on the next
        // connect reflects the book's current state, which supersedes them.
        // A closed channel means the client was dropped; stop reconnecting.
        loop {
            match command_rx.try_recv() {
                Ok(_) => continue,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }

        if !config.auto_reconnect {
            let _ = status_tx.send(ConnectionState::Failed);
            return;
        }

        reconnect_attempts += 1;
        let delay =
            (config.reconnect_delay * 2u32.pow((reconnect_attempts - 1).min(5))).min(RECONNECT_DELAY_MAX);
        info!(
            "Reconnecting in {:?} (attempt {})",
            delay, reconnect_attempts
        );
        tokio::time::sleep(delay).await;
    }
}

/// Serialize and send one control message
async fn send_control<W>(write: &mut W, message: &ClientMessage) -> Result<(), ()>
where
    W: futures_util::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize control message: {}", e);
            return Err(());
        }
    };

    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| warn!("Failed to send control message"))
}

/// Handle one incoming text frame
fn handle_text(text: &str, book: &ListenerBook) {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Failed to parse server message: {}", e);
            return;
        }
    };

    match message {
        ServerMessage::PriceUpdate { sample } => {
            let delivered = book.dispatch(&sample);
            debug!("Dispatched {} to {} listeners", sample.symbol, delivered);
        }
        ServerMessage::Subscribed { symbol } => debug!("Subscription confirmed for {}", symbol),
        ServerMessage::Unsubscribed { symbol } => debug!("Unsubscription confirmed for {}", symbol),
        ServerMessage::Pong { .. } => debug!("Received pong"),
        ServerMessage::Error { code, message } => {
            warn!("Server error {:?}: {}", code, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickstream_core::PriceSample;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Accept one WebSocket connection and return the symbols of the first
    /// `expect` subscribe frames it carries
    async fn collect_subscribes(
        listener: &TcpListener,
        expect: usize,
    ) -> (
        Vec<String>,
        tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    ) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let mut symbols = Vec::new();
        while symbols.len() < expect {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ClientMessage = serde_json::from_str(&text).unwrap();
                    if let ClientMessage::Subscribe { symbol } = msg {
                        symbols.push(symbol.as_str().to_string());
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            }
        }
        (symbols, ws)
    }

    fn test_config(addr: std::net::SocketAddr) -> PriceFeedConfig {
        PriceFeedConfig {
            url: format!("ws://{}", addr),
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn delivers_samples_to_listeners() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (symbols, mut ws) = collect_subscribes(&listener, 1).await;
            assert_eq!(symbols, vec!["TSLA"]);

            let update = ServerMessage::PriceUpdate {
                sample: PriceSample::seeded(Symbol::new("TSLA"), 800.0),
            };
            ws.send(Message::Text(serde_json::to_string(&update).unwrap().into()))
                .await
                .unwrap();

            // Hold the connection open until the client is done
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = PriceFeedClient::new(test_config(addr));
        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel::<PriceSample>();
        let _handle = client.subscribe("TSLA", move |sample: &PriceSample| {
            let _ = sample_tx.send(sample.clone());
        });

        let sample = tokio::time::timeout(Duration::from_secs(5), sample_rx.recv())
            .await
            .expect("timed out waiting for a price update")
            .expect("sample channel closed");
        assert_eq!(sample.symbol.as_str(), "TSLA");
        assert_eq!(sample.price, 800.0);

        drop(client);
        server.abort();
    }

    #[tokio::test]
    async fn replays_active_subscriptions_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Vec<String>>();
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (symbols, ws) = collect_subscribes(&listener, 2).await;
                seen_tx.send(symbols).unwrap();
                // Dropping the socket closes the connection, forcing the
                // client through its reconnect path after the first round
                drop(ws);
            }
        });

        let client = PriceFeedClient::new(test_config(addr));
        let _aapl = client.subscribe("AAPL", |_| {});
        let _msft = client.subscribe("MSFT", |_| {});

        let mut first = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("timed out waiting for initial subscribes")
            .unwrap();
        first.sort();
        assert_eq!(first, vec!["AAPL", "MSFT"]);

        let mut replayed = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .expect("timed out waiting for replayed subscribes")
            .unwrap();
        replayed.sort();
        assert_eq!(replayed, vec!["AAPL", "MSFT"], "each symbol replays exactly once");

        drop(client);
        server.abort();
    }

    #[tokio::test]
    async fn last_listener_removal_sends_one_unsubscribe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    control_tx.send(serde_json::from_str(&text).unwrap()).unwrap();
                }
            }
        });

        let client = PriceFeedClient::new(test_config(addr));
        let h1 = client.subscribe("NFLX", |_| {});
        let h2 = client.subscribe("NFLX", |_| {});
        let h3 = client.subscribe("NFLX", |_| {});

        // Exactly one subscribe goes out for the three listeners
        let first = tokio::time::timeout(Duration::from_secs(5), control_rx.recv())
            .await
            .expect("timed out waiting for subscribe")
            .unwrap();
        assert!(matches!(first, ClientMessage::Subscribe { ref symbol } if symbol.as_str() == "NFLX"));

        // Removing two listeners keeps the subscription open
        client.unsubscribe(&h1);
        client.unsubscribe(&h2);

        // Removing the last one sends exactly one unsubscribe
        client.unsubscribe(&h3);
        let next = tokio::time::timeout(Duration::from_secs(5), control_rx.recv())
            .await
            .expect("timed out waiting for unsubscribe")
            .unwrap();
        assert!(matches!(next, ClientMessage::Unsubscribe { ref symbol } if symbol.as_str() == "NFLX"));

        // Nothing else was sent in between
        assert!(control_rx.try_recv().is_err());

        drop(client);
        server.abort();
    }
}
