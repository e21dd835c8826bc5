//! Symbol listing and realtime snapshot endpoints

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tickstream_core::{PriceSample, Symbol};
use tracing::debug;

use crate::AppState;

/// One catalog entry with its latest price, if any has been generated
#[derive(Debug, Serialize)]
pub struct SymbolListing {
    pub symbol: Symbol,
    pub name: String,
    pub sector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<PriceSample>,
}

/// Response for listing symbols
#[derive(Debug, Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<SymbolListing>,
    pub count: usize,
}

/// Create symbol routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/symbols", get(list_symbols))
        .route("/realtime/{symbol}", get(get_realtime))
}

/// List catalog symbols with their last-known prices
async fn list_symbols(State(state): State<AppState>) -> impl IntoResponse {
    let symbols: Vec<SymbolListing> = state
        .catalog
        .companies()
        .into_iter()
        .map(|company| {
            let last = state.store.get(&company.symbol);
            SymbolListing {
                symbol: company.symbol,
                name: company.name,
                sector: company.sector,
                last,
            }
        })
        .collect();

    let count = symbols.len();
    Json(SymbolsResponse { symbols, count })
}

/// Current price snapshot for one symbol.
///
/// Unknown symbols are seeded at the base price rather than rejected, so
/// this endpoint always has a sample to return.
async fn get_realtime(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = Symbol::new(symbol);
    debug!("Realtime snapshot requested for {}", symbol);
    Json(state.store.get_or_seed(&symbol))
}
