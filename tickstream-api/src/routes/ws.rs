//! WebSocket route handler
//!
//! Handles the WebSocket upgrade and adapts axum's socket type to the
//! tungstenite stream/sink pair the session handler expects.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::info;

use crate::AppState;

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channels bridging between axum's message type and tungstenite's
    let (inbound_tx, inbound_rx) =
        tokio::sync::mpsc::channel::<tokio_tungstenite::tungstenite::Message>(100);
    let (outbound_tx, mut outbound_rx) =
        tokio::sync::mpsc::channel::<tokio_tungstenite::tungstenite::Message>(100);

    // Task: forward frames from the axum receiver into the bridge
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let tungstenite_msg = match msg {
                Message::Text(text) => {
                    tokio_tungstenite::tungstenite::Message::Text(text.to_string().into())
                }
                Message::Binary(data) => {
                    tokio_tungstenite::tungstenite::Message::Binary(data.to_vec().into())
                }
                Message::Ping(data) => {
                    tokio_tungstenite::tungstenite::Message::Ping(data.to_vec().into())
                }
                Message::Pong(data) => {
                    tokio_tungstenite::tungstenite::Message::Pong(data.to_vec().into())
                }
                Message::Close(_) => {
                    break;
                }
            };

            if inbound_tx.send(tungstenite_msg).await.is_err() {
                break;
            }
        }
    });

    // Task: forward frames from the bridge out through the axum sender
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let axum_msg = match msg {
                tokio_tungstenite::tungstenite::Message::Text(text) => {
                    Message::Text(text.to_string().into())
                }
                tokio_tungstenite::tungstenite::Message::Binary(data) => {
                    Message::Binary(Bytes::from(data.to_vec()))
                }
                tokio_tungstenite::tungstenite::Message::Ping(data) => {
                    Message::Ping(Bytes::from(data.to_vec()))
                }
                tokio_tungstenite::tungstenite::Message::Pong(data) => {
                    Message::Pong(Bytes::from(data.to_vec()))
                }
                tokio_tungstenite::tungstenite::Message::Close(_) => {
                    break;
                }
                tokio_tungstenite::tungstenite::Message::Frame(_) => continue,
            };

            if sender.send(axum_msg).await.is_err() {
                break;
            }
        }
    });

    // Run the session over the bridged stream/sink pair
    let bridge = SocketBridge {
        rx: inbound_rx,
        tx: outbound_tx,
    };
    state.ws_state.handle_connection(bridge).await;

    // Clean up bridge tasks
    recv_task.abort();
    send_task.abort();
}

/// Adapts the bridge channels to the stream/sink interface expected by
/// the session handler
struct SocketBridge {
    rx: tokio::sync::mpsc::Receiver<tokio_tungstenite::tungstenite::Message>,
    tx: tokio::sync::mpsc::Sender<tokio_tungstenite::tungstenite::Message>,
}

impl futures_util::Stream for SocketBridge {
    type Item =
        Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>;

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

impl futures_util::Sink<tokio_tungstenite::tungstenite::Message> for SocketBridge {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn start_send(
        self: std::pin::Pin<&mut Self>,
        item: tokio_tungstenite::tungstenite::Message,
    ) -> Result<(), Self::Error> {
        // Best-effort: a full bridge drops the frame rather than blocking
        let _ = self.tx.try_send(item);
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
