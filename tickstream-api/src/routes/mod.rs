//! API route definitions

mod health;
mod symbols;
pub mod ws;

use crate::AppState;
use axum::Router;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(symbols::routes())
        .merge(health::routes())
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}
