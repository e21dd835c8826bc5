//! Tick generator
//!
//! Background task that produces a synthetic random-walk price sample for
//! every tracked symbol on a fixed period, writes it to the price store, and
//! hands it to the broadcast dispatcher.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tickstream_core::{PriceSample, Symbol};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::price_store::PriceStore;
use crate::websocket::WsState;

/// Configuration for the tick generator
#[derive(Debug, Clone)]
pub struct TickGeneratorConfig {
    /// Wall-clock period between ticks
    pub tick_interval: Duration,
    /// Maximum single-tick magnitude as a fraction of the previous price
    pub max_tick_pct: f64,
    /// Lowest price a tick can produce; keeps percent math finite
    pub price_floor: f64,
}

impl Default for TickGeneratorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(3000),
            max_tick_pct: 0.02,
            price_floor: 1.0,
        }
    }
}

/// Periodic price producer for every symbol in the store
pub struct TickGenerator {
    config: TickGeneratorConfig,
    store: Arc<PriceStore>,
    ws_state: Arc<WsState>,
}

impl TickGenerator {
    /// Create a new generator over the given store and dispatcher
    pub fn new(config: TickGeneratorConfig, store: Arc<PriceStore>, ws_state: Arc<WsState>) -> Self {
        Self {
            config,
            store,
            ws_state,
        }
    }

    /// Spawn the periodic tick loop and return its lifecycle handle.
    ///
    /// The loop runs until [`TickGeneratorHandle::stop`] is called (or the
    /// handle is dropped). Dispatch never blocks the timer: deliveries go
    /// through bounded per-session outboxes.
    pub fn start(self) -> TickGeneratorHandle {
        info!(
            "Starting tick generator with {:?} period for {} symbols",
            self.config.tick_interval,
            self.store.len()
        );

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            // The first interval tick completes immediately; consume it so
            // seeded prices stand for one full period before the first walk
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_cycle(),
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Tick generator stopped");
        });

        TickGeneratorHandle { shutdown_tx, task }
    }

    /// Produce and dispatch one sample per tracked symbol
    fn run_cycle(&self) {
        let symbols = self.store.symbols();
        if symbols.is_empty() {
            debug!("No symbols tracked, skipping tick cycle");
            return;
        }

        let mut rng = rand::rng();
        for symbol in symbols {
            let Some(prev) = self.store.get(&symbol) else {
                continue;
            };

            let frac = rng.random_range(-1.0..1.0) * self.config.max_tick_pct;
            let volume = rng.random_range(100_000u64..1_100_000);
            let sample = Self::sample_from(symbol, prev.price, frac, volume, &self.config);

            self.store.set(sample.clone());
            self.ws_state.broadcast_price_update(sample);
        }
    }

    /// Build the next sample from the previous price and a fractional draw.
    ///
    /// `frac` is the signed fractional move for this tick, already scaled by
    /// the configured maximum (so it lies in `[-max_tick_pct, max_tick_pct]`).
    /// The result is floored at `price_floor`, which keeps the walk strictly
    /// positive and the percent change finite for every positive input.
    pub fn sample_from(
        symbol: Symbol,
        prev_price: f64,
        frac: f64,
        volume: u64,
        config: &TickGeneratorConfig,
    ) -> PriceSample {
        let delta = prev_price * frac;
        let price = (prev_price + delta).max(config.price_floor);
        let change = price - prev_price;
        let change_percent = if prev_price > 0.0 {
            format!("{:.2}", change / prev_price * 100.0)
        } else {
            "0.00".to_string()
        };

        PriceSample {
            symbol,
            price,
            change,
            change_percent,
            volume,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle handle for a running tick generator.
///
/// Dropping the handle also stops the loop.
pub struct TickGeneratorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl TickGeneratorHandle {
    /// Signal the loop to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
