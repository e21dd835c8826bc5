//! Tickstream API Server
//!
//! HTTP/WebSocket server that streams simulated price updates to
//! subscribed viewers.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tickstream_services::{
    PriceStore, StaticCatalog, SymbolCatalog, TickGenerator, TickGeneratorConfig, WsState,
    DEFAULT_BASE_PRICE,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PriceStore>,
    pub ws_state: Arc<WsState>,
    pub catalog: Arc<dyn SymbolCatalog>,
}

/// Parse an environment variable, falling back to a default
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tickstream_api=debug")),
        )
        .init();

    info!("Starting Tickstream API");

    // Price store, seeded from the catalog so ticks flow before the first
    // subscribe; unknown symbols still get seeded lazily
    let base_price = env_parse("BASE_PRICE", DEFAULT_BASE_PRICE);
    let store = Arc::new(PriceStore::with_base_price(base_price));

    let catalog: Arc<dyn SymbolCatalog> = Arc::new(StaticCatalog::default());
    for company in catalog.companies() {
        store.get_or_seed(&company.symbol);
    }
    info!("Seeded {} symbols from the catalog", store.len());

    // WebSocket state (subscription registry + dispatcher)
    let ws_state = Arc::new(WsState::new(Arc::clone(&store)));

    // Start the tick generator
    let tick_config = TickGeneratorConfig {
        tick_interval: Duration::from_millis(env_parse("TICK_INTERVAL_MS", 3000u64)),
        max_tick_pct: env_parse("TICK_MAX_PCT", 0.02f64),
        price_floor: env_parse("PRICE_FLOOR", 1.0f64),
    };
    let generator = TickGenerator::new(tick_config, Arc::clone(&store), Arc::clone(&ws_state));
    let tick_handle = generator.start();

    // Create app state
    let state = AppState {
        store,
        ws_state,
        catalog,
    };

    // Configure CORS for the viewer frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // Build router
    let app = Router::new()
        .nest("/api", routes::api_routes())
        .merge(routes::ws_routes())
        .layer(cors)
        .with_state(state);

    // Start server
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the tick loop with the server so no tick fires into a
    // torn-down dispatcher
    tick_handle.stop().await;

    Ok(())
}

/// Resolve when the process receives a shutdown signal
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
