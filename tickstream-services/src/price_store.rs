//! In-memory price store
//!
//! Single source of truth for the last-known price sample of every tracked
//! symbol. Reads and writes are race-free under concurrent tick writes and
//! session-handler reads.

use parking_lot::RwLock;
use std::collections::HashMap;
use tickstream_core::{PriceSample, Symbol};
use tracing::debug;

/// Base price assigned to a symbol that has never traded
pub const DEFAULT_BASE_PRICE: f64 = 100.0;

/// Snapshot of store counters for health reporting
#[derive(Debug, Clone, serde::Serialize)]
pub struct PriceStoreStats {
    /// Number of tracked symbols
    pub tracked_symbols: usize,
}

/// In-memory mapping from symbol to its last-known price sample.
///
/// A symbol becomes tracked either by explicit seeding (catalog at startup)
/// or lazily on first access; the store always has some price to report for
/// a known symbol. Prices never go negative: seeds are clamped at zero and
/// every tick-generated sample is floored upstream.
pub struct PriceStore {
    prices: RwLock<HashMap<Symbol, PriceSample>>,
    base_price: f64,
}

impl PriceStore {
    /// Create a store with the default base price
    pub fn new() -> Self {
        Self::with_base_price(DEFAULT_BASE_PRICE)
    }

    /// Create a store with a custom base price for unseeded symbols
    pub fn with_base_price(base_price: f64) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            base_price: base_price.max(0.0),
        }
    }

    /// Last-known sample for a symbol, if tracked
    pub fn get(&self, symbol: &Symbol) -> Option<PriceSample> {
        self.prices.read().get(symbol).cloned()
    }

    /// Store the latest sample for its symbol
    pub fn set(&self, sample: PriceSample) {
        self.prices.write().insert(sample.symbol.clone(), sample);
    }

    /// Last-known sample for a symbol, seeding it at the base price on
    /// first access so an unknown symbol is never an error
    pub fn get_or_seed(&self, symbol: &Symbol) -> PriceSample {
        if let Some(sample) = self.get(symbol) {
            return sample;
        }
        let mut prices = self.prices.write();
        // Another writer may have seeded between the read and this lock
        prices
            .entry(symbol.clone())
            .or_insert_with(|| {
                debug!("Seeding {} at base price {}", symbol, self.base_price);
                PriceSample::seeded(symbol.clone(), self.base_price)
            })
            .clone()
    }

    /// Seed a symbol at an explicit price, replacing any prior sample.
    ///
    /// Negative inputs are clamped to zero.
    pub fn seed(&self, symbol: &Symbol, price: f64) -> PriceSample {
        let sample = PriceSample::seeded(symbol.clone(), price.max(0.0));
        self.set(sample.clone());
        sample
    }

    /// All tracked symbols (sweep order is unspecified)
    pub fn symbols(&self) -> Vec<Symbol> {
        self.prices.read().keys().cloned().collect()
    }

    /// Number of tracked symbols
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether any symbol is tracked
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }

    /// Counters for health reporting
    pub fn stats(&self) -> PriceStoreStats {
        PriceStoreStats {
            tracked_symbols: self.len(),
        }
    }
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_for_untracked_symbol() {
        let store = PriceStore::new();
        assert!(store.get(&Symbol::new("AAPL")).is_none());
    }

    #[test]
    fn get_or_seed_initializes_at_base_price() {
        let store = PriceStore::new();
        let sample = store.get_or_seed(&Symbol::new("AAPL"));
        assert_eq!(sample.price, DEFAULT_BASE_PRICE);
        assert_eq!(sample.change_percent, "0.00");

        // Subsequent reads see the same seeded sample, not a fresh one
        let again = store.get(&Symbol::new("AAPL")).unwrap();
        assert_eq!(again.price, sample.price);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_replaces_last_sample() {
        let store = PriceStore::new();
        let symbol = Symbol::new("TSLA");
        store.seed(&symbol, 800.0);

        let mut next = store.get(&symbol).unwrap();
        next.price = 808.0;
        store.set(next);

        assert_eq!(store.get(&symbol).unwrap().price, 808.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn seed_clamps_negative_prices() {
        let store = PriceStore::new();
        let sample = store.seed(&Symbol::new("JUNK"), -5.0);
        assert_eq!(sample.price, 0.0);
    }

    #[test]
    fn symbols_lists_tracked_symbols() {
        let store = PriceStore::new();
        store.seed(&Symbol::new("AAPL"), 150.0);
        store.seed(&Symbol::new("MSFT"), 300.0);

        let mut symbols = store.symbols();
        symbols.sort();
        assert_eq!(symbols, vec![Symbol::new("AAPL"), Symbol::new("MSFT")]);
    }
}
