//! Quote Provider Trait
//!
//! Common interface over upstream market data sources. The trading and
//! symbol services only talk to this trait, which keeps them independent of
//! Finnhub and lets tests and the offline demo use the simulated provider.

use crate::domain::entities::quote::Quote;
use crate::domain::entities::symbol::SymbolListing;
use async_trait::async_trait;
use thiserror::Error;

pub type QuoteResult<T> = Result<T, QuoteError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuoteError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Quote provider not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Fetch the current quote of `symbol`
    async fn fetch_quote(&self, symbol: &str) -> QuoteResult<Quote>;

    /// List the symbols tradable on `exchange`
    async fn list_symbols(&self, exchange: &str) -> QuoteResult<Vec<SymbolListing>>;
}
