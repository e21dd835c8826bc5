//! Price data structures for streamed market updates

use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generated price observation with derived change metrics.
///
/// Samples are produced by the tick generator (or synthesized when a symbol
/// is first seeded) and are immutable once emitted; a new tick produces a new
/// sample rather than mutating a prior one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Symbol this sample belongs to
    pub symbol: Symbol,

    /// Last price; never below the configured floor
    pub price: f64,

    /// Absolute change against the previous sample
    pub change: f64,

    /// Percentage change against the previous sample, formatted with
    /// two decimals (e.g. "1.00")
    pub change_percent: String,

    /// Synthetic trade volume associated with this tick
    pub volume: u64,

    /// When this sample was generated
    pub timestamp: DateTime<Utc>,
}

impl PriceSample {
    /// Synthesize the initial sample for a freshly seeded symbol.
    ///
    /// Used when a symbol becomes tracked before its first tick: the system
    /// always has some price to report, with zeroed change metrics.
    pub fn seeded(symbol: Symbol, price: f64) -> Self {
        Self {
            symbol,
            price,
            change: 0.0,
            change_percent: "0.00".to_string(),
            volume: 0,
            timestamp: Utc::now(),
        }
    }
}

/// A listed company known to the symbol catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    /// Ticker symbol
    pub symbol: Symbol,

    /// Human-readable company name
    pub name: String,

    /// Sector label (e.g. "Technology")
    pub sector: String,
}

impl Company {
    pub fn new(symbol: impl Into<Symbol>, name: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector: sector.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sample_has_zero_change() {
        let sample = PriceSample::seeded(Symbol::new("AAPL"), 100.0);
        assert_eq!(sample.price, 100.0);
        assert_eq!(sample.change, 0.0);
        assert_eq!(sample.change_percent, "0.00");
        assert_eq!(sample.volume, 0);
    }
}
