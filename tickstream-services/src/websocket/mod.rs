//! WebSocket subscription and broadcast machinery
//!
//! Tracks which sessions are interested in which symbols and pushes price
//! updates to the members of each symbol's room.

pub mod handler;
pub mod subscription;

pub use handler::WsState;
pub use subscription::{SessionId, SubscriptionRegistry};
