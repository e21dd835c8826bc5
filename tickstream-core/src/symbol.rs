//! Ticker symbol identity type

use serde::{Deserialize, Serialize};

/// Ticker symbol identifying a tradable instrument (e.g. "AAPL").
///
/// Symbols are normalized to ASCII uppercase at construction so that
/// `"aapl"` and `"AAPL"` refer to the same room and the same stored price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing to uppercase
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(s.as_ref().trim().to_ascii_uppercase())
    }

    /// The symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol::new(s)
    }
}
