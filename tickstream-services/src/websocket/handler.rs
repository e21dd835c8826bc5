//! WebSocket connection handler
//!
//! Handles individual WebSocket sessions: decoding control messages,
//! registering interest with the subscription registry, and pushing price
//! updates into session outboxes.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tickstream_core::{ClientMessage, ErrorCode, PriceSample, ServerMessage, StreamError};
use tracing::{debug, error, info, warn};

use super::subscription::{SessionId, SubscriptionRegistry};
use crate::price_store::PriceStore;

/// Shared state for WebSocket session handlers
#[derive(Clone)]
pub struct WsState {
    /// Subscription registry (rooms + session outboxes)
    pub registry: Arc<SubscriptionRegistry>,
    /// Last-known prices
    pub store: Arc<PriceStore>,
}

impl WsState {
    /// Create new WebSocket state over a price store
    pub fn new(store: Arc<PriceStore>) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            store,
        }
    }

    /// Handle a new WebSocket connection until either side closes it.
    ///
    /// Spawns a send task draining the session outbox and processes inbound
    /// control messages on the calling task. Cleanup (`remove_session`) runs
    /// exactly once when the connection ends, however it ends.
    pub async fn handle_connection<S>(&self, socket: S)
    where
        S: futures_util::Stream<
                Item = Result<
                    tokio_tungstenite::tungstenite::Message,
                    tokio_tungstenite::tungstenite::Error,
                >,
            > + futures_util::Sink<
                tokio_tungstenite::tungstenite::Message,
                Error = tokio_tungstenite::tungstenite::Error,
            > + Send
            + 'static,
    {
        let session_id = self.registry.new_session_id();
        info!("New WebSocket session: {}", session_id);

        let (mut ws_sender, mut ws_receiver) = socket.split();
        let mut outgoing_rx = self.registry.register_session(session_id);

        // Task: serialize outbox messages onto the wire
        let send_task = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                if ws_sender
                    .send(tokio_tungstenite::tungstenite::Message::Text(json.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        // Task: receive and process incoming control messages
        let recv_task = {
            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            async move {
                while let Some(result) = ws_receiver.next().await {
                    match result {
                        Ok(msg) => {
                            if let Err(e) =
                                Self::handle_message(session_id, msg, &registry, &store)
                            {
                                warn!("Error handling message from {}: {}", session_id, e);
                            }
                        }
                        Err(e) => {
                            debug!("WebSocket error for {}: {}", session_id, e);
                            break;
                        }
                    }
                }
            }
        };

        // Wait for either task to complete (connection closed)
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        // Clean up room membership and the outbox
        self.registry.remove_session(session_id);
        info!("WebSocket session closed: {}", session_id);
    }

    /// Handle an incoming WebSocket message
    fn handle_message(
        session_id: SessionId,
        msg: tokio_tungstenite::tungstenite::Message,
        registry: &Arc<SubscriptionRegistry>,
        store: &Arc<PriceStore>,
    ) -> Result<(), StreamError> {
        use tokio_tungstenite::tungstenite::Message;

        match msg {
            Message::Text(text) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        registry.send_to(
                            session_id,
                            ServerMessage::Error {
                                code: ErrorCode::InvalidMessage,
                                message: format!("Invalid JSON: {}", e),
                            },
                        );
                        return Err(StreamError::parse(format!("Invalid JSON: {}", e)));
                    }
                };

                match client_msg {
                    ClientMessage::Subscribe { symbol } => {
                        registry.join(&symbol, session_id);
                        registry.send_to(
                            session_id,
                            ServerMessage::Subscribed {
                                symbol: symbol.clone(),
                            },
                        );

                        // Send the current value right away so the viewer
                        // does not wait a full tick period for first data;
                        // unknown symbols are seeded, not rejected
                        let sample = store.get_or_seed(&symbol);
                        registry.send_to(session_id, ServerMessage::PriceUpdate { sample });
                    }
                    ClientMessage::Unsubscribe { symbol } => {
                        registry.leave(&symbol, session_id);
                        registry.send_to(session_id, ServerMessage::Unsubscribed { symbol });
                    }
                    ClientMessage::Ping { timestamp } => {
                        registry.send_to(
                            session_id,
                            ServerMessage::Pong {
                                client_timestamp: timestamp,
                                server_timestamp: Utc::now().timestamp_millis(),
                            },
                        );
                    }
                }
            }
            Message::Ping(_) => {
                // Handled automatically by tungstenite
                debug!("Received ping from {}", session_id);
            }
            Message::Pong(_) => {
                debug!("Received pong from {}", session_id);
            }
            Message::Close(_) => {
                debug!("Received close from {}", session_id);
            }
            Message::Binary(_) => {
                registry.send_to(
                    session_id,
                    ServerMessage::Error {
                        code: ErrorCode::InvalidMessage,
                        message: "Binary messages not supported".to_string(),
                    },
                );
            }
            Message::Frame(_) => {
                // Raw frames not supported
            }
        }

        Ok(())
    }

    /// Push a price update to every member of the sample's room
    pub fn broadcast_price_update(&self, sample: PriceSample) {
        let symbol = sample.symbol.clone();
        self.registry
            .broadcast_to_room(&symbol, ServerMessage::PriceUpdate { sample });
    }
}

impl std::fmt::Debug for WsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsState")
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_generator::{TickGenerator, TickGeneratorConfig};
    use std::time::Duration;
    use tickstream_core::Symbol;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    /// In-memory socket backed by channels, standing in for a real
    /// WebSocket on either side of `handle_connection`
    struct TestSocket {
        rx: mpsc::UnboundedReceiver<Message>,
        tx: mpsc::UnboundedSender<Message>,
    }

    impl futures_util::Stream for TestSocket {
        type Item = Result<Message, tokio_tungstenite::tungstenite::Error>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            match self.rx.poll_recv(cx) {
                std::task::Poll::Ready(Some(msg)) => std::task::Poll::Ready(Some(Ok(msg))),
                std::task::Poll::Ready(None) => std::task::Poll::Ready(None),
                std::task::Poll::Pending => std::task::Poll::Pending,
            }
        }
    }

    impl futures_util::Sink<Message> for TestSocket {
        type Error = tokio_tungstenite::tungstenite::Error;

        fn poll_ready(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn start_send(
            self: std::pin::Pin<&mut Self>,
            item: Message,
        ) -> Result<(), Self::Error> {
            let _ = self.tx.send(item);
            Ok(())
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    /// Returns the socket plus the client-side handles: a sender for
    /// inbound frames and a receiver for outbound frames
    fn test_socket() -> (
        TestSocket,
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            TestSocket {
                rx: inbound_rx,
                tx: outbound_tx,
            },
            inbound_tx,
            outbound_rx,
        )
    }

    async fn next_server_message(
        rx: &mut mpsc::UnboundedReceiver<Message>,
    ) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed before message arrived");
        match frame {
            Message::Text(text) => serde_json::from_str(&text).expect("invalid server JSON"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscribe_confirms_and_sends_current_price() {
        let state = WsState::new(Arc::new(PriceStore::new()));
        state.store.seed(&Symbol::new("TSLA"), 800.0);

        let (socket, client_tx, mut client_rx) = test_socket();
        let conn_state = state.clone();
        let conn = tokio::spawn(async move { conn_state.handle_connection(socket).await });

        client_tx
            .send(Message::Text(
                r#"{"type":"subscribe","symbol":"TSLA"}"#.into(),
            ))
            .unwrap();

        match next_server_message(&mut client_rx).await {
            ServerMessage::Subscribed { symbol } => assert_eq!(symbol.as_str(), "TSLA"),
            other => panic!("expected subscription confirmation, got {:?}", other),
        }
        match next_server_message(&mut client_rx).await {
            ServerMessage::PriceUpdate { sample } => {
                assert_eq!(sample.symbol.as_str(), "TSLA");
                assert_eq!(sample.price, 800.0);
            }
            other => panic!("expected immediate price update, got {:?}", other),
        }

        // Closing the inbound side tears the session down and cleans up
        drop(client_tx);
        conn.await.unwrap();
        assert_eq!(state.registry.session_count(), 0);
        assert_eq!(state.registry.room_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_to_unknown_symbol_seeds_it() {
        let state = WsState::new(Arc::new(PriceStore::new()));

        let (socket, client_tx, mut client_rx) = test_socket();
        let conn_state = state.clone();
        tokio::spawn(async move { conn_state.handle_connection(socket).await });

        client_tx
            .send(Message::Text(
                r#"{"type":"subscribe","symbol":"ZZZZ"}"#.into(),
            ))
            .unwrap();

        let _subscribed = next_server_message(&mut client_rx).await;
        match next_server_message(&mut client_rx).await {
            ServerMessage::PriceUpdate { sample } => {
                assert_eq!(sample.price, crate::price_store::DEFAULT_BASE_PRICE);
            }
            other => panic!("expected seeded price update, got {:?}", other),
        }
        assert!(state.store.get(&Symbol::new("ZZZZ")).is_some());
    }

    #[tokio::test]
    async fn malformed_message_reports_error_and_keeps_session_alive() {
        let state = WsState::new(Arc::new(PriceStore::new()));

        let (socket, client_tx, mut client_rx) = test_socket();
        let conn_state = state.clone();
        tokio::spawn(async move { conn_state.handle_connection(socket).await });

        client_tx
            .send(Message::Text("this is not json".into()))
            .unwrap();
        match next_server_message(&mut client_rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidMessage),
            other => panic!("expected error message, got {:?}", other),
        }

        // Session is still usable afterwards
        client_tx
            .send(Message::Text(
                r#"{"type":"subscribe","symbol":"AAPL"}"#.into(),
            ))
            .unwrap();
        match next_server_message(&mut client_rx).await {
            ServerMessage::Subscribed { symbol } => assert_eq!(symbol.as_str(), "AAPL"),
            other => panic!("expected subscription confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn tick_after_fixed_draw_reaches_only_the_subscribed_session() {
        let state = WsState::new(Arc::new(PriceStore::new()));
        state.store.seed(&Symbol::new("TSLA"), 800.0);

        let subscriber = state.registry.new_session_id();
        let bystander = state.registry.new_session_id();
        let mut subscriber_rx = state.registry.register_session(subscriber);
        let mut bystander_rx = state.registry.register_session(bystander);
        state.registry.join(&Symbol::new("TSLA"), subscriber);

        // One tick with a fixed +1% draw: 800.00 -> 808.00
        let config = TickGeneratorConfig::default();
        let prev = state.store.get(&Symbol::new("TSLA")).unwrap();
        let sample =
            TickGenerator::sample_from(Symbol::new("TSLA"), prev.price, 0.01, 650_000, &config);
        state.store.set(sample.clone());
        state.broadcast_price_update(sample);

        match subscriber_rx.try_recv().expect("subscriber should get the tick") {
            ServerMessage::PriceUpdate { sample } => {
                assert_eq!(sample.price, 808.0);
                assert_eq!(sample.change, 8.0);
                assert_eq!(sample.change_percent, "1.00");
            }
            other => panic!("expected price update, got {:?}", other),
        }
        assert!(subscriber_rx.try_recv().is_err(), "exactly one delivery expected");
        assert!(bystander_rx.try_recv().is_err(), "bystander must not receive the tick");
    }

    #[tokio::test]
    async fn unsubscribed_session_misses_the_next_tick() {
        let state = WsState::new(Arc::new(PriceStore::new()));
        state.store.seed(&Symbol::new("NFLX"), 500.0);

        let staying = state.registry.new_session_id();
        let leaving = state.registry.new_session_id();
        let mut staying_rx = state.registry.register_session(staying);
        let mut leaving_rx = state.registry.register_session(leaving);
        state.registry.join(&Symbol::new("NFLX"), staying);
        state.registry.join(&Symbol::new("NFLX"), leaving);

        WsState::handle_message(
            leaving,
            Message::Text(r#"{"type":"unsubscribe","symbol":"NFLX"}"#.into()),
            &state.registry,
            &state.store,
        )
        .unwrap();
        match leaving_rx.try_recv().expect("unsubscribe should be confirmed") {
            ServerMessage::Unsubscribed { symbol } => assert_eq!(symbol.as_str(), "NFLX"),
            other => panic!("expected unsubscribe confirmation, got {:?}", other),
        }

        let sample = PriceSample::seeded(Symbol::new("NFLX"), 501.0);
        state.broadcast_price_update(sample);

        assert!(matches!(
            staying_rx.try_recv().expect("remaining session should get the tick"),
            ServerMessage::PriceUpdate { .. }
        ));
        assert!(leaving_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let state = WsState::new(Arc::new(PriceStore::new()));
        let id = state.registry.new_session_id();
        let mut rx = state.registry.register_session(id);

        WsState::handle_message(
            id,
            Message::Text(r#"{"type":"ping","timestamp":42}"#.into()),
            &state.registry,
            &state.store,
        )
        .unwrap();

        match rx.try_recv().expect("ping should be answered") {
            ServerMessage::Pong {
                client_timestamp, ..
            } => assert_eq!(client_timestamp, 42),
            other => panic!("expected pong, got {:?}", other),
        }
    }
}
