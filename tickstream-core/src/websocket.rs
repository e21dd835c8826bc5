//! WebSocket message types for real-time price data
//!
//! These types define the protocol for WebSocket communication between
//! the server and clients.

use serde::{Deserialize, Serialize};

use crate::price::PriceSample;
use crate::symbol::Symbol;

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to price updates for a symbol
    Subscribe {
        symbol: Symbol,
    },
    /// Unsubscribe from price updates for a symbol
    Unsubscribe {
        symbol: Symbol,
    },
    /// Ping to keep the connection alive
    Ping {
        /// Client timestamp (milliseconds)
        timestamp: i64,
    },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmed
    Subscribed {
        symbol: Symbol,
    },
    /// Unsubscription confirmed
    Unsubscribed {
        symbol: Symbol,
    },
    /// Price update for a subscribed symbol
    PriceUpdate {
        sample: PriceSample,
    },
    /// Error message
    Error {
        code: ErrorCode,
        message: String,
    },
    /// Pong response to client ping
    Pong {
        /// Echo back client timestamp
        client_timestamp: i64,
        /// Server timestamp
        server_timestamp: i64,
    },
}

/// Error codes for WebSocket errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid message format
    InvalidMessage,
    /// Internal server error
    InternalError,
}

/// Connection state reported by the client-side feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connected and receiving data
    Connected,
    /// Attempting to connect
    Connecting,
    /// Disconnected, will attempt reconnect
    Disconnected,
    /// Connection failed, not retrying
    Failed,
}
