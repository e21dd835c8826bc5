//! Core types for the Tickstream real-time price service
//!
//! This crate defines the shared data structures used across the service,
//! including symbols, price samples, and the WebSocket wire protocol.

pub mod error;
pub mod price;
pub mod symbol;
pub mod websocket;

pub use error::{StreamError, StreamResult};
pub use price::{Company, PriceSample};
pub use symbol::Symbol;
pub use websocket::{ClientMessage, ConnectionState, ErrorCode, ServerMessage};
