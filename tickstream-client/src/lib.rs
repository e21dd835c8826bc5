//! Viewer-side subscription manager for the Tickstream price feed
//!
//! Multiplexes any number of local listeners over exactly one transport
//! subscription per symbol, and resubscribes every active symbol
//! automatically after a reconnect.

pub mod listeners;
pub mod websocket;

pub use listeners::{BookAction, ListenerBook, ListenerHandle};
pub use websocket::{PriceFeedClient, PriceFeedConfig};
