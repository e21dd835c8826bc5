//! Business logic services for the Tickstream price streaming server
//!
//! This crate provides the service layer: the in-memory price store, the
//! periodic tick generator, the symbol catalog seam, and the WebSocket
//! subscription/broadcast machinery.

pub mod catalog;
pub mod price_store;
pub mod tick_generator;
pub mod websocket;

pub use catalog::{StaticCatalog, SymbolCatalog};
pub use price_store::{PriceStore, PriceStoreStats, DEFAULT_BASE_PRICE};
pub use tick_generator::{TickGenerator, TickGeneratorConfig, TickGeneratorHandle};
pub use websocket::{SessionId, SubscriptionRegistry, WsState};
