//! Symbol catalog seam
//!
//! Narrow interface to the catalog/history collaborator. The streaming core
//! only needs it for the list of known symbols, used to pre-seed tracking at
//! startup and to serve the REST listing; symbols outside the catalog still
//! become tracked lazily on first subscribe.

use tickstream_core::Company;

/// Source of the known-company listing
pub trait SymbolCatalog: Send + Sync {
    /// All companies known to the catalog
    fn companies(&self) -> Vec<Company>;
}

/// In-process catalog backed by a fixed company table
pub struct StaticCatalog {
    companies: Vec<Company>,
}

impl StaticCatalog {
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(vec![
            Company::new("AAPL", "Apple Inc.", "Technology"),
            Company::new("GOOGL", "Alphabet Inc.", "Technology"),
            Company::new("MSFT", "Microsoft Corp.", "Technology"),
            Company::new("AMZN", "Amazon.com Inc.", "E-Commerce"),
            Company::new("TSLA", "Tesla Inc.", "Automotive"),
            Company::new("META", "Meta Platforms Inc.", "Social Media"),
            Company::new("NFLX", "Netflix Inc.", "Entertainment"),
            Company::new("NVDA", "NVIDIA Corp.", "Technology"),
            Company::new("AMD", "Advanced Micro Devices", "Technology"),
            Company::new("INTC", "Intel Corp.", "Technology"),
            Company::new("BABA", "Alibaba Group", "E-Commerce"),
            Company::new("CRM", "Salesforce Inc.", "Technology"),
            Company::new("ORCL", "Oracle Corp.", "Technology"),
            Company::new("IBM", "IBM Corp.", "Technology"),
            Company::new("PYPL", "PayPal Holdings", "Fintech"),
        ])
    }
}

impl SymbolCatalog for StaticCatalog {
    fn companies(&self) -> Vec<Company> {
        self.companies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_lists_companies() {
        let catalog = StaticCatalog::default();
        let companies = catalog.companies();
        assert_eq!(companies.len(), 15);
        assert!(companies.iter().any(|c| c.symbol.as_str() == "AAPL"));
    }
}
